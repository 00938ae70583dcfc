//! # storage-adapters
//!
//! Implementations of the storage ports: the document store, its file
//! persistence, and image blob stores.

pub mod images;
pub mod memory;
#[cfg(feature = "snapshot")]
pub mod snapshot;

pub use images::{LocalImageStore, MemoryImageStore};
pub use memory::MemoryDocumentStore;
#[cfg(feature = "snapshot")]
pub use snapshot::JsonSnapshot;
