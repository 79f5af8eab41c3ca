//! # Review Service
//!
//! Coordinates the write and read paths: registry lookup, identity
//! resolution, rating validation, persistence through the `ReviewRepo` port
//! and cached-aggregate maintenance.

use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tracing::{info, instrument};

use crate::aggregate::{AggregateMaintainer, ReviewChange};
use crate::config::{ReviewableConfig, ReviewableSpec};
use crate::error::{Result, ReviewError};
use crate::identity::{self, Identifiers};
use crate::models::{CachedAggregates, Identity, Review, ReviewFields, ReviewableRef};
use crate::query::ReviewQuery;
use crate::registry::ReviewableRegistry;
use crate::scale::round_to;
use crate::submission::Submission;
use crate::traits::ReviewRepo;

/// Placeholder reviewer in error context for operations not tied to one.
const ANY_REVIEWER: &str = "any reviewer";

pub struct ReviewService {
    repo: Arc<dyn ReviewRepo>,
    registry: ReviewableRegistry,
    aggregates: AggregateMaintainer,
}

impl ReviewService {
    pub fn new(repo: Arc<dyn ReviewRepo>) -> Self {
        Self {
            aggregates: AggregateMaintainer::new(repo.clone()),
            registry: ReviewableRegistry::new(),
            repo,
        }
    }

    pub fn registry(&self) -> &ReviewableRegistry {
        &self.registry
    }

    // Registration

    /// Makes `reviewable_type` reviewable. The storage is asked once which
    /// cache columns the type has; the answer is frozen into the config.
    #[instrument(skip(self, spec))]
    pub async fn configure(&self, reviewable_type: &str, spec: &ReviewableSpec) -> Result<Arc<ReviewableConfig>> {
        let cache = self
            .repo
            .cache_capability(reviewable_type)
            .await
            .map_err(|e| ReviewError::record("probe cache columns", reviewable_type, ANY_REVIEWER, e))?;
        self.registry.register(reviewable_type, spec, cache)
    }

    pub fn is_reviewable(&self, reviewable_type: &str) -> bool {
        self.registry.is_registered(reviewable_type)
    }

    pub fn config_for(&self, reviewable_type: &str) -> Option<Arc<ReviewableConfig>> {
        self.registry.config_for(reviewable_type)
    }

    pub fn resolve_identity(&self, reviewable: &ReviewableRef, identifiers: &Identifiers) -> Result<Identity> {
        let config = self.registry.require(&reviewable.kind)?;
        identity::resolve(identifiers, &config)
    }

    // Write Operations

    /// Creates the review of this reviewer on `reviewable`, or overwrites the
    /// rating, body and custom fields of the existing one.
    #[instrument(skip_all, fields(reviewable = %reviewable))]
    pub async fn submit_review(
        &self,
        reviewable: &ReviewableRef,
        identifiers: &Identifiers,
        fields: ReviewFields,
    ) -> Result<Review> {
        let config = self.registry.require(&reviewable.kind)?;
        let identity = identity::resolve(identifiers, &config)?;
        if let Some(rating) = fields.rating {
            if !config.is_valid_rating(&[rating]) {
                return Err(ReviewError::invalid_value(rating, config.rating_scale()));
            }
        }

        let existing = self
            .repo
            .find_review(reviewable, &identity)
            .await
            .map_err(|e| ReviewError::record("look up review", reviewable, &identity, e))?;

        let attempted = format!("rating {:?}", fields.rating);
        let (review, change) = match existing {
            Some(mut review) => {
                review.apply(fields);
                self.repo
                    .update_review(&review)
                    .await
                    .map_err(|e| ReviewError::record(format!("update review with {attempted}"), reviewable, &identity, e))?;
                (review, ReviewChange::Updated)
            }
            None => {
                let mut review = Review::new(reviewable.clone(), identity.clone());
                review.apply(fields);
                review.updated_at = review.created_at;
                self.repo
                    .insert_review(&review)
                    .await
                    .map_err(|e| ReviewError::record(format!("create review with {attempted}"), reviewable, &identity, e))?;
                (review, ReviewChange::Inserted)
            }
        };

        self.aggregates
            .apply(reviewable, &config, change)
            .await
            .map_err(|e| ReviewError::record("update cached aggregates", reviewable, &identity, e))?;

        info!(review_id = %review.id, reviewer = %identity, rating = ?review.rating, ?change, "review saved");
        Ok(review)
    }

    /// [`submit_review`](Self::submit_review) for a raw submission object
    /// carrying both the identifiers and the review fields.
    pub async fn submit_json(&self, reviewable: &ReviewableRef, submission: Value) -> Result<Review> {
        let Submission { identifiers, fields } = Submission::from_json(submission)?;
        self.submit_review(reviewable, &identifiers, fields).await
    }

    /// Deletes the review of this reviewer on `reviewable`.
    #[instrument(skip_all, fields(reviewable = %reviewable))]
    pub async fn remove_review(&self, reviewable: &ReviewableRef, identifiers: &Identifiers) -> Result<()> {
        let config = self.registry.require(&reviewable.kind)?;
        let identity = identity::resolve(identifiers, &config)?;

        let review = self
            .repo
            .find_review(reviewable, &identity)
            .await
            .map_err(|e| ReviewError::record("look up review", reviewable, &identity, e))?
            .ok_or_else(|| ReviewError::record("remove review", reviewable, &identity, anyhow!("no review exists")))?;

        let removed = self
            .repo
            .delete_review(review.id)
            .await
            .map_err(|e| ReviewError::record("remove review", reviewable, &identity, e))?;
        if !removed {
            return Err(ReviewError::record(
                "remove review",
                reviewable,
                &identity,
                anyhow!("review {} was already gone", review.id),
            ));
        }

        self.aggregates
            .apply(reviewable, &config, ReviewChange::Deleted)
            .await
            .map_err(|e| ReviewError::record("update cached aggregates", reviewable, &identity, e))?;

        info!(review_id = %review.id, reviewer = %identity, "review removed");
        Ok(())
    }

    /// Cascade for a deleted reviewable: drops all of its reviews.
    #[instrument(skip_all, fields(reviewable = %reviewable))]
    pub async fn destroy_reviewable(&self, reviewable: &ReviewableRef) -> Result<u64> {
        let removed = self
            .repo
            .delete_reviews(&ReviewQuery::on(reviewable))
            .await
            .map_err(|e| ReviewError::record("delete reviews", reviewable, ANY_REVIEWER, e))?;
        info!(removed, "reviews removed with reviewable");
        Ok(removed)
    }

    /// Cascade for a deleted reviewer: drops all of its reviews and refreshes
    /// the aggregates of every reviewable it had reviewed.
    #[instrument(skip_all, fields(reviewer = %identity))]
    pub async fn destroy_reviewer(&self, identity: &Identity) -> Result<u64> {
        let affected = self.reviewables_by(identity).await?;
        let removed = self
            .repo
            .delete_reviews(&ReviewQuery::by(identity))
            .await
            .map_err(|e| ReviewError::record("delete reviews", "any reviewable", identity, e))?;

        for reviewable in &affected {
            if let Some(config) = self.registry.config_for(&reviewable.kind) {
                self.aggregates
                    .refresh(reviewable, &config)
                    .await
                    .map_err(|e| ReviewError::record("update cached aggregates", reviewable, identity, e))?;
            }
        }
        info!(removed, reviewables = affected.len(), "reviews removed with reviewer");
        Ok(removed)
    }

    // Read Operations

    /// Number of reviews, served from the cache column when the type has one.
    pub async fn total_reviews(&self, reviewable: &ReviewableRef) -> Result<i64> {
        let config = self.registry.require(&reviewable.kind)?;
        if config.cache.total_reviews {
            if let Some(total) = self.cached(reviewable).await?.total_reviews {
                return Ok(total);
            }
        }
        self.recount_total_reviews(reviewable).await
    }

    /// Number of reviews, always counted from the review rows.
    pub async fn recount_total_reviews(&self, reviewable: &ReviewableRef) -> Result<i64> {
        self.aggregates
            .compute_total(reviewable)
            .await
            .map_err(|e| ReviewError::record("count reviews", reviewable, ANY_REVIEWER, e))
    }

    pub async fn is_reviewed(&self, reviewable: &ReviewableRef) -> Result<bool> {
        Ok(self.total_reviews(reviewable).await? > 0)
    }

    /// Average rating, served from the cache column when the type has one.
    pub async fn average_rating(&self, reviewable: &ReviewableRef) -> Result<f64> {
        let config = self.registry.require(&reviewable.kind)?;
        if config.cache.average_rating {
            if let Some(average) = self.cached(reviewable).await?.average_rating {
                return Ok(average);
            }
        }
        self.recalculate_average_rating(reviewable).await
    }

    /// Average rating, always computed from the review rows.
    pub async fn recalculate_average_rating(&self, reviewable: &ReviewableRef) -> Result<f64> {
        let config = self.registry.require(&reviewable.kind)?;
        self.aggregates
            .compute_average(reviewable, &config)
            .await
            .map_err(|e| ReviewError::record("average ratings", reviewable, ANY_REVIEWER, e))
    }

    /// Average of the ratings one reviewer gave `reviewable`; `0.0` if none.
    pub async fn average_rating_by(&self, reviewable: &ReviewableRef, identifiers: &Identifiers) -> Result<f64> {
        let config = self.registry.require(&reviewable.kind)?;
        let identity = identity::resolve(identifiers, &config)?;
        let query = ReviewQuery::on(reviewable).and_by(&identity).with_a_rating();
        let average = self
            .repo
            .average_rating(&query)
            .await
            .map_err(|e| ReviewError::record("average ratings", reviewable, &identity, e))?;
        Ok(round_to(average.unwrap_or(0.0), config.precision))
    }

    pub async fn has_reviewed(&self, reviewable: &ReviewableRef, identifiers: &Identifiers) -> Result<bool> {
        Ok(self.review_by(reviewable, identifiers).await?.is_some())
    }

    pub async fn review_by(&self, reviewable: &ReviewableRef, identifiers: &Identifiers) -> Result<Option<Review>> {
        let identity = self.resolve_identity(reviewable, identifiers)?;
        self.repo
            .find_review(reviewable, &identity)
            .await
            .map_err(|e| ReviewError::record("look up review", reviewable, &identity, e))
    }

    /// Filtered, ordered review listing.
    pub async fn reviews(&self, query: &ReviewQuery) -> Result<Vec<Review>> {
        self.repo
            .list_reviews(query)
            .await
            .map_err(|e| ReviewError::record("list reviews", "any reviewable", ANY_REVIEWER, e))
    }

    /// Number of reviews matching `query`, ignoring its order and limit.
    pub async fn count(&self, query: &ReviewQuery) -> Result<i64> {
        self.repo
            .count_reviews(&query.unpaged())
            .await
            .map_err(|e| ReviewError::record("count reviews", "any reviewable", ANY_REVIEWER, e))
    }

    /// Identities that reviewed `reviewable`, oldest review first.
    pub async fn reviewers_of(&self, reviewable: &ReviewableRef) -> Result<Vec<Identity>> {
        let reviews = self.reviews(&ReviewQuery::on(reviewable).in_order()).await?;
        Ok(reviews.into_iter().map(|r| r.reviewer).collect())
    }

    /// Reviewables `identity` has reviewed, oldest review first.
    pub async fn reviewables_by(&self, identity: &Identity) -> Result<Vec<ReviewableRef>> {
        let reviews = self.reviews(&ReviewQuery::by(identity).in_order()).await?;
        Ok(reviews.into_iter().map(|r| r.reviewable).collect())
    }

    // Cache Recovery

    /// Recomputes and stores the cached aggregates of one reviewable.
    #[instrument(skip_all, fields(reviewable = %reviewable))]
    pub async fn refresh_aggregates(&self, reviewable: &ReviewableRef) -> Result<()> {
        let config = self.registry.require(&reviewable.kind)?;
        self.aggregates
            .refresh(reviewable, &config)
            .await
            .map_err(|e| ReviewError::record("update cached aggregates", reviewable, ANY_REVIEWER, e))
    }

    /// Refreshes every stored reviewable of `reviewable_type`, reviewed or
    /// not. Returns how many were refreshed.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self, reviewable_type: &str) -> Result<usize> {
        let config = self.registry.require(reviewable_type)?;
        if !config.cache.any() {
            info!("type has no cache columns, nothing to refresh");
            return Ok(0);
        }

        let ids = self
            .repo
            .reviewable_ids(reviewable_type)
            .await
            .map_err(|e| ReviewError::record("list reviewables", reviewable_type, ANY_REVIEWER, e))?;

        for id in &ids {
            let reviewable = ReviewableRef::new(reviewable_type, *id);
            self.aggregates
                .refresh(&reviewable, &config)
                .await
                .map_err(|e| ReviewError::record("update cached aggregates", &reviewable, ANY_REVIEWER, e))?;
        }
        info!(count = ids.len(), "refreshed cached aggregates");
        Ok(ids.len())
    }

    async fn cached(&self, reviewable: &ReviewableRef) -> Result<CachedAggregates> {
        self.repo
            .cached_aggregates(reviewable)
            .await
            .map_err(|e| ReviewError::record("read cached aggregates", reviewable, ANY_REVIEWER, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheCapability, ReviewerRef};
    use crate::scale::ScaleSpec;
    use crate::traits::MockReviewRepo;

    fn post() -> ReviewableRef {
        ReviewableRef::new("post", 1)
    }

    fn user(id: i64) -> Identifiers {
        Identifiers::reviewer(ReviewerRef::new("user", id))
    }

    fn half_star_spec() -> ReviewableSpec {
        ReviewableSpec {
            scale: ScaleSpec::float_range(1.0, 5.0),
            step: Some(0.5),
            precision: Some(2),
            accept_ip: true,
            ..ReviewableSpec::default()
        }
    }

    async fn service_with(mut repo: MockReviewRepo, cache: CacheCapability) -> ReviewService {
        repo.expect_cache_capability().returning(move |_| Ok(cache));
        let service = ReviewService::new(Arc::new(repo));
        service.configure("post", &half_star_spec()).await.unwrap();
        service
    }

    #[tokio::test]
    async fn test_unregistered_type_is_a_config_error() {
        let service = ReviewService::new(Arc::new(MockReviewRepo::new()));
        let err = service
            .submit_review(&ReviewableRef::new("page", 1), &user(1), ReviewFields::rated(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidConfigValue(_)));
    }

    #[tokio::test]
    async fn test_out_of_scale_rating_never_reaches_storage() {
        let service = service_with(MockReviewRepo::new(), CacheCapability::NONE).await;
        let err = service.submit_review(&post(), &user(1), ReviewFields::rated(6.0)).await.unwrap_err();
        match err {
            ReviewError::InvalidReviewValue { value, scale } => {
                assert_eq!(value, "6");
                assert!(scale.starts_with("1.0, 1.5"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reviewer_errors_pass_through_unwrapped() {
        let service = service_with(MockReviewRepo::new(), CacheCapability::NONE).await;
        let guest = Identifiers::reviewer(ReviewerRef::new("guest", 1));
        let err = service.submit_review(&post(), &guest, ReviewFields::rated(1.0)).await.unwrap_err();
        assert!(matches!(err, ReviewError::InvalidReviewer(_)));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_storage_failure_is_wrapped_with_context() {
        let mut repo = MockReviewRepo::new();
        repo.expect_find_review().returning(|_, _| Ok(None));
        repo.expect_insert_review().returning(|_| Err(anyhow!("disk full")));
        let service = service_with(repo, CacheCapability::NONE).await;

        let err = service.submit_review(&post(), &user(9), ReviewFields::rated(2.5)).await.unwrap_err();
        match &err {
            ReviewError::Record { action, reviewable, reviewer, source } => {
                assert_eq!(action, "create review with rating Some(2.5)");
                assert_eq!(reviewable, "post#1");
                assert_eq!(reviewer, "user#9");
                assert_eq!(source.to_string(), "disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn test_insert_bumps_cached_total_and_recomputes_average() {
        let mut repo = MockReviewRepo::new();
        repo.expect_find_review().returning(|_, _| Ok(None));
        repo.expect_insert_review().times(1).returning(|_| Ok(()));
        repo.expect_increment_cached_total()
            .withf(|_, delta| *delta == 1)
            .times(1)
            .returning(|_, _| Ok(true));
        repo.expect_store_cached_total().never();
        repo.expect_average_rating().returning(|_| Ok(Some(1.754)));
        repo.expect_store_cached_average()
            .withf(|_, avg| *avg == 1.75)
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service_with(repo, CacheCapability::ALL).await;

        let review = service.submit_review(&post(), &user(1), ReviewFields::rated(1.0)).await.unwrap();
        assert_eq!(review.rating, Some(1.0));
        assert_eq!(review.created_at, review.updated_at);
    }

    #[tokio::test]
    async fn test_unclean_increment_falls_back_to_recount() {
        let mut repo = MockReviewRepo::new();
        repo.expect_find_review().returning(|_, _| Ok(None));
        repo.expect_insert_review().returning(|_| Ok(()));
        repo.expect_increment_cached_total().returning(|_, _| Ok(false));
        repo.expect_count_reviews().returning(|_| Ok(3));
        repo.expect_store_cached_total()
            .withf(|_, total| *total == 3)
            .times(1)
            .returning(|_, _| Ok(()));
        let cache = CacheCapability { total_reviews: true, average_rating: false };
        let service = service_with(repo, cache).await;

        service.submit_review(&post(), &user(1), ReviewFields::rated(3.0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_increment_falls_back_to_recount() {
        let mut repo = MockReviewRepo::new();
        repo.expect_find_review().returning(|_, _| Ok(None));
        repo.expect_insert_review().returning(|_| Ok(()));
        repo.expect_increment_cached_total().returning(|_, _| Err(anyhow!("row locked")));
        repo.expect_count_reviews().returning(|_| Ok(1));
        repo.expect_store_cached_total().times(1).returning(|_, _| Ok(()));
        let cache = CacheCapability { total_reviews: true, average_rating: false };
        let service = service_with(repo, cache).await;

        service.submit_review(&post(), &user(1), ReviewFields::rated(3.0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_keeps_associations_and_skips_counter() {
        let identity = Identity::Reviewer(ReviewerRef::new("user", 2));
        let mut existing = Review::new(post(), identity.clone());
        existing.rating = Some(2.5);
        existing.custom_fields.insert("title".into(), "Old".into());
        let existing_id = existing.id;

        let mut repo = MockReviewRepo::new();
        repo.expect_find_review().returning(move |_, _| Ok(Some(existing.clone())));
        repo.expect_update_review()
            .withf(move |r| r.id == existing_id && r.rating == Some(3.0))
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_insert_review().never();
        repo.expect_increment_cached_total().never();
        repo.expect_average_rating().returning(|_| Ok(Some(2.0)));
        repo.expect_store_cached_average().times(1).returning(|_, _| Ok(()));
        let service = service_with(repo, CacheCapability::ALL).await;

        let review = service.submit_review(&post(), &user(2), ReviewFields::rated(3.0)).await.unwrap();
        assert_eq!(review.id, existing_id);
        assert_eq!(review.reviewer, identity);
        assert_eq!(review.reviewable, post());
        assert_eq!(review.custom_fields.get("title"), Some(&Value::from("Old")));
    }

    #[tokio::test]
    async fn test_cache_failure_after_write_is_a_record_error() {
        let mut repo = MockReviewRepo::new();
        repo.expect_find_review().returning(|_, _| Ok(None));
        repo.expect_insert_review().times(1).returning(|_| Ok(()));
        repo.expect_average_rating().returning(|_| Err(anyhow!("timeout")));
        let cache = CacheCapability { total_reviews: false, average_rating: true };
        let service = service_with(repo, cache).await;

        let err = service.submit_review(&post(), &user(1), ReviewFields::rated(1.0)).await.unwrap_err();
        assert!(matches!(err, ReviewError::Record { ref action, .. } if action == "update cached aggregates"));
    }

    #[tokio::test]
    async fn test_remove_without_review_is_a_record_error() {
        let mut repo = MockReviewRepo::new();
        repo.expect_find_review().returning(|_, _| Ok(None));
        repo.expect_delete_review().never();
        let service = service_with(repo, CacheCapability::ALL).await;

        let err = service.remove_review(&post(), &Identifiers::ip("128.0.0.3")).await.unwrap_err();
        assert!(matches!(err, ReviewError::Record { .. }));
    }

    #[tokio::test]
    async fn test_remove_decrements_cached_total() {
        let review = Review::new(post(), Identity::Ip("128.0.0.3".into()));
        let mut repo = MockReviewRepo::new();
        repo.expect_find_review().returning(move |_, _| Ok(Some(review.clone())));
        repo.expect_delete_review().times(1).returning(|_| Ok(true));
        repo.expect_increment_cached_total()
            .withf(|_, delta| *delta == -1)
            .times(1)
            .returning(|_, _| Ok(true));
        repo.expect_average_rating().returning(|_| Ok(None));
        repo.expect_store_cached_average()
            .withf(|_, avg| *avg == 0.0)
            .returning(|_, _| Ok(()));
        let service = service_with(repo, CacheCapability::ALL).await;

        service.remove_review(&post(), &Identifiers::ip("128.0.0.3")).await.unwrap();
    }

    #[tokio::test]
    async fn test_reads_prefer_cache_columns() {
        let mut repo = MockReviewRepo::new();
        repo.expect_cached_aggregates().returning(|_| {
            Ok(CachedAggregates { total_reviews: Some(4), average_rating: Some(3.5) })
        });
        repo.expect_count_reviews().never();
        let service = service_with(repo, CacheCapability::ALL).await;

        assert_eq!(service.total_reviews(&post()).await.unwrap(), 4);
        assert_eq!(service.average_rating(&post()).await.unwrap(), 3.5);
        assert!(service.is_reviewed(&post()).await.unwrap());
    }

    #[tokio::test]
    async fn test_reads_without_cache_query_reviews() {
        let mut repo = MockReviewRepo::new();
        repo.expect_cached_aggregates().never();
        repo.expect_count_reviews().returning(|_| Ok(0));
        repo.expect_average_rating().returning(|_| Ok(None));
        let service = service_with(repo, CacheCapability::NONE).await;

        assert_eq!(service.total_reviews(&post()).await.unwrap(), 0);
        assert_eq!(service.average_rating(&post()).await.unwrap(), 0.0);
        assert!(!service.is_reviewed(&post()).await.unwrap());
    }
}
