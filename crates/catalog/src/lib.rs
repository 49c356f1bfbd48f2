pub mod bus;
pub mod memory;
pub mod model;
pub mod pg;

pub use bus::{ChangeBus, ChangeEvent, ChangeEventKind, Subscription};
pub use memory::MemoryCatalog;
pub use model::{Catalog, CatalogError, DocumentView, IndexedContent, IndexedContentRef};
pub use pg::PgCatalog;
