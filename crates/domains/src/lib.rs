//! threadbase/crates/domains/src/lib.rs
//!
//! The document model, error taxonomy and port definitions shared by every crate.

pub mod errors;
pub mod inputs;
pub mod models;
pub mod ports;
pub mod search;
pub mod validation;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use inputs::*;
pub use models::*;
pub use ports::*;
pub use search::*;
