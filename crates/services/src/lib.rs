//! # services
//!
//! The document indexing and query layer: materialized views over the
//! store, thread reconstruction, the vote ledger and search, assembled
//! behind [`ForumService`]. Depends only on the ports in `domains`.

pub mod forum;
pub mod search;
pub mod thread;
pub mod views;
pub mod votes;

pub use forum::{ForumDeps, ForumOptions, ForumService, DEFAULT_MAX_THREAD_DEPTH};
pub use search::{SearchFacade, DEFAULT_RANKING_LIMIT};
pub use thread::{Thread, ThreadNode, ThreadSnapshot, ThreadWalk};
pub use views::{RebuildReport, ViewDefinition, ViewEngine, ViewKey, ViewQuery, ViewRegistry, ViewRow};
pub use votes::{VoteLedger, DEFAULT_MAX_ATTEMPTS};
