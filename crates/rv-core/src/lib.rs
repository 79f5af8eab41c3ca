//! rusty-reviews/crates/rv-core/src/lib.rs
//!
//! The review aggregation engine: rating scales, reviewer identity, the
//! create-or-update write path and cached aggregate maintenance, plus the
//! port a storage plugin implements.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod query;
pub mod registry;
pub mod scale;
pub mod service;
pub mod submission;
pub mod traits;

// Re-exporting for easier access in other crates
pub use config::*;
pub use error::*;
pub use identity::{Candidate, Identifiers};
pub use models::*;
pub use query::*;
pub use registry::ReviewableRegistry;
pub use scale::{Scale, ScaleSpec};
pub use service::ReviewService;
pub use submission::Submission;
pub use traits::*;
