/// File types the indexing pipeline recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
  Markdown,
  Docx,
  Pdf,
}

impl FileType {
  pub fn as_str(&self) -> &'static str {
    match self {
      FileType::Markdown => "md",
      FileType::Docx => "docx",
      FileType::Pdf => "pdf",
    }
  }

  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext.to_ascii_lowercase().as_str() {
      "md" | "markdown" => Some(FileType::Markdown),
      "docx" => Some(FileType::Docx),
      "pdf" => Some(FileType::Pdf),
      _ => None,
    }
  }

  /// Infer the filetype from magic bytes, falling back to the uri extension.
  ///
  /// Markdown has no magic signature and is only ever matched by extension.
  /// A zip container (docx is one) is only accepted when the extension
  /// agrees, since the signature alone is ambiguous.
  pub fn detect(uri: &str, bytes: &[u8]) -> Option<Self> {
    if bytes.starts_with(b"%PDF-") {
      return Some(FileType::Pdf);
    }
    let by_extension = extension(uri).and_then(Self::from_extension);
    if bytes.starts_with(b"PK\x03\x04") {
      return match by_extension {
        Some(FileType::Docx) => Some(FileType::Docx),
        _ => None,
      };
    }
    by_extension
  }
}

impl std::fmt::Display for FileType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The extension reported for unrecognized uploads, for error messages.
pub fn extension(uri: &str) -> Option<&str> {
  let name = uri.rsplit('/').next()?;
  let (stem, ext) = name.rsplit_once('.')?;
  if stem.is_empty() { None } else { Some(ext) }
}
