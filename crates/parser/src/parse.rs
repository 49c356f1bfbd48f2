use seemantic_core::{FileType, ParsedDocument, extension};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::convert::{ConvertError, DocumentConverter, MarkdownConverter};

#[derive(Error, Debug)]
pub enum ParseError {
  /// The filetype is not in the supported set (or no converter is wired
  /// for it). Carries the extension/type name for the public error message.
  #[error("unsupported filetype {0}")]
  UnsupportedType(String),
  #[error("parse error: {0}")]
  Malformed(String),
}

impl From<ConvertError> for ParseError {
  fn from(e: ConvertError) -> Self {
    match e {
      ConvertError::Malformed(msg) => ParseError::Malformed(msg),
    }
  }
}

/// Converts recognized source documents to canonical, content-addressed
/// markdown.
///
/// Filetype is inferred from magic bytes with a filename-extension fallback.
/// The supported set is the set of registered converters: markdown is built
/// in, pdf/docx converters are registered by the host application.
pub struct Parser {
  converters: HashMap<FileType, Box<dyn DocumentConverter>>,
}

impl Default for Parser {
  fn default() -> Self {
    Self::new()
  }
}

impl Parser {
  pub fn new() -> Self {
    let mut converters: HashMap<FileType, Box<dyn DocumentConverter>> = HashMap::new();
    converters.insert(FileType::Markdown, Box::new(MarkdownConverter));
    Self { converters }
  }

  /// Register (or replace) the converter for one filetype.
  pub fn with_converter(mut self, filetype: FileType, converter: Box<dyn DocumentConverter>) -> Self {
    self.converters.insert(filetype, converter);
    self
  }

  /// Whether `parse` would accept this document.
  pub fn is_parsable(&self, uri: &str, bytes: &[u8]) -> bool {
    FileType::detect(uri, bytes).is_some_and(|t| self.converters.contains_key(&t))
  }

  /// Parse raw bytes into canonical markdown with its content hash.
  ///
  /// Deterministic: the same bytes always produce the same `parsed_hash`.
  pub fn parse(&self, uri: &str, bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let filetype = FileType::detect(uri, bytes)
      .ok_or_else(|| ParseError::UnsupportedType(extension(uri).unwrap_or("unknown").to_string()))?;
    let converter = self
      .converters
      .get(&filetype)
      .ok_or_else(|| ParseError::UnsupportedType(filetype.as_str().to_string()))?;
    let markdown = converter.convert(bytes)?;
    let parsed = ParsedDocument::from_markdown(markdown);
    debug!(uri, filetype = %filetype, parsed_hash = %parsed.parsed_hash, "parsed document");
    Ok(parsed)
  }
}
