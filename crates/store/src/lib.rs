pub mod chunks;
pub mod connection;
pub mod parsed;
pub mod query;
pub mod schema;

pub use connection::{StoreError, VectorStore};
pub use query::DocumentHit;
