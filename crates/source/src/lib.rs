pub mod drive;
pub mod fs;
pub mod memory;
pub mod store;

pub use drive::{DocumentReference, DriveSource, SourceDocument, SourceEvent};
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use store::{ObjectContent, ObjectEvent, ObjectMeta, ObjectStore, SourceError};
