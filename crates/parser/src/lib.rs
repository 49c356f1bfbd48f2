pub mod convert;
pub mod parse;

pub use convert::{ConvertError, DocumentConverter, MarkdownConverter};
pub use parse::{ParseError, Parser};
