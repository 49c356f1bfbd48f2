pub mod config;
pub mod document;
pub mod filetype;
pub mod markdown;

pub use config::{ConfigError, EmbedderSettings, Settings};
pub use document::{
  Chunk, ChunkHit, DistanceMetric, EmbeddedChunk, IndexingStatus, ParsedDocument, content_hash,
};
pub use filetype::{FileType, extension};
pub use markdown::header_offsets;
