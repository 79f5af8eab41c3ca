//! # Core Traits (Ports)
//!
//! Any storage plugin must implement these traits to back the review service.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{CacheCapability, CachedAggregates, Identity, Review, ReviewableRef};
use crate::query::ReviewQuery;

/// Data persistence contract for reviews and the cached aggregates stored on
/// reviewable entities.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReviewRepo: Send + Sync {
    // Schema
    /// Reports which cache columns the storage of `reviewable_type` carries.
    async fn cache_capability(&self, reviewable_type: &str) -> anyhow::Result<CacheCapability>;

    // Review Operations
    async fn find_review(&self, reviewable: &ReviewableRef, identity: &Identity) -> anyhow::Result<Option<Review>>;
    async fn insert_review(&self, review: &Review) -> anyhow::Result<()>;
    /// Writes back rating, body, custom fields and `updated_at`.
    async fn update_review(&self, review: &Review) -> anyhow::Result<()>;
    /// Returns whether a row was actually removed.
    async fn delete_review(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn delete_reviews(&self, query: &ReviewQuery) -> anyhow::Result<u64>;

    // Read Queries
    async fn list_reviews(&self, query: &ReviewQuery) -> anyhow::Result<Vec<Review>>;
    async fn count_reviews(&self, query: &ReviewQuery) -> anyhow::Result<i64>;
    /// Average over non-null ratings; `None` when there are none.
    async fn average_rating(&self, query: &ReviewQuery) -> anyhow::Result<Option<f64>>;

    // Reviewables
    /// Ids of every stored entity of `reviewable_type`, ascending.
    async fn reviewable_ids(&self, reviewable_type: &str) -> anyhow::Result<Vec<i64>>;

    // Cached Aggregates
    async fn cached_aggregates(&self, reviewable: &ReviewableRef) -> anyhow::Result<CachedAggregates>;
    /// Applies `delta` to the cached total if it can be done cleanly. Returns
    /// `false` when the stored value is missing or would go negative.
    async fn increment_cached_total(&self, reviewable: &ReviewableRef, delta: i64) -> anyhow::Result<bool>;
    async fn store_cached_total(&self, reviewable: &ReviewableRef, total: i64) -> anyhow::Result<()>;
    async fn store_cached_average(&self, reviewable: &ReviewableRef, average: f64) -> anyhow::Result<()>;
}
