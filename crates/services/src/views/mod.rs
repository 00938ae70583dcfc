//! # Views
//!
//! Named, versioned map/reduce projections over the document store, kept
//! current by change notifications.

pub mod engine;
pub mod key;
pub mod registry;

pub use engine::{RebuildReport, ViewEngine};
pub use key::{ViewKey, ViewQuery, ViewRow, MAX_SENTINEL};
pub use registry::{
    reduce_count, reduce_sum, MapError, MapFn, ReduceFn, ViewDefinition, ViewRegistry,
    CHANNELS_BY_ID, POSTS_BY_CHANNEL, POST_COUNT_BY_AUTHOR, REPLIES_BY_PARENT,
    REPLY_COUNT_BY_AUTHOR, USERS_BY_ID, USERS_BY_USERNAME,
};
