//! Entity storage: the contract and its in-memory and file implementations.
mod error;
mod file;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use file::FileEntityStore;
pub use memory::InMemoryEntityStore;
pub use traits::EntityStore;
