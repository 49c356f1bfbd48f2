pub mod chunker;
pub mod indexer;
pub mod queue;
pub mod reconcile;

pub use chunker::Chunker;
pub use indexer::{IndexFailure, Indexer, IndexerConfig, IndexerError};
pub use queue::{WorkItem, WorkQueue, WorkReceiver, work_queue};
pub use reconcile::{Classification, classify, deleted_uris};
