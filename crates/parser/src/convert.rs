use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("malformed document: {0}")]
  Malformed(String),
}

/// Converts raw bytes of one filetype to canonical markdown.
///
/// The heavyweight pdf/docx conversion machinery lives behind this trait and
/// is supplied by the embedding application; only the markdown converter
/// ships built in. Conversion must be deterministic for fixed input bytes.
pub trait DocumentConverter: Send + Sync {
  fn convert(&self, bytes: &[u8]) -> Result<String, ConvertError>;
}

/// Markdown passes through as-is; the canonical form is the UTF-8 text.
pub struct MarkdownConverter;

impl DocumentConverter for MarkdownConverter {
  fn convert(&self, bytes: &[u8]) -> Result<String, ConvertError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| ConvertError::Malformed(format!("invalid utf-8: {e}")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_markdown_passthrough() {
    let md = MarkdownConverter.convert("# Title\n\nbody".as_bytes()).unwrap();
    assert_eq!(md, "# Title\n\nbody");
  }

  #[test]
  fn test_markdown_rejects_invalid_utf8() {
    let err = MarkdownConverter.convert(&[0xff, 0xfe, 0x00]).unwrap_err();
    assert!(matches!(err, ConvertError::Malformed(_)));
  }
}
