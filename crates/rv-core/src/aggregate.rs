//! # Aggregate Maintenance
//!
//! Keeps `cached_total_reviews` / `cached_average_rating` in line with the
//! review rows after every write.
//!
//! The total is bumped incrementally and recounted whenever the bump cannot be
//! applied cleanly. Concurrent writers on the same reviewable may still make
//! the counter drift; nothing here serializes them. The average is always a
//! fresh aggregate query so it heals on the next write regardless.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ReviewableConfig;
use crate::models::ReviewableRef;
use crate::query::ReviewQuery;
use crate::scale::round_to;
use crate::traits::ReviewRepo;

/// What happened to a reviewable's review set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewChange {
    Inserted,
    Updated,
    Deleted,
}

impl ReviewChange {
    fn delta(self) -> i64 {
        match self {
            Self::Inserted => 1,
            Self::Updated => 0,
            Self::Deleted => -1,
        }
    }
}

#[derive(Clone)]
pub struct AggregateMaintainer {
    repo: Arc<dyn ReviewRepo>,
}

impl AggregateMaintainer {
    pub fn new(repo: Arc<dyn ReviewRepo>) -> Self {
        Self { repo }
    }

    /// Brings the cached fields up to date after `change`. Types without cache
    /// columns are skipped.
    pub async fn apply(
        &self,
        reviewable: &ReviewableRef,
        config: &ReviewableConfig,
        change: ReviewChange,
    ) -> anyhow::Result<()> {
        if config.cache.total_reviews && change.delta() != 0 {
            match self.repo.increment_cached_total(reviewable, change.delta()).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(%reviewable, "cached total not applicable, recounting");
                    self.store_recount(reviewable).await?;
                }
                Err(e) => {
                    warn!(%reviewable, error = %e, "incremental total update failed, recounting");
                    self.store_recount(reviewable).await?;
                }
            }
        }

        if config.cache.average_rating {
            let average = self.compute_average(reviewable, config).await?;
            self.repo.store_cached_average(reviewable, average).await?;
        }
        Ok(())
    }

    /// Recomputes every cached field from scratch.
    pub async fn refresh(&self, reviewable: &ReviewableRef, config: &ReviewableConfig) -> anyhow::Result<()> {
        if config.cache.total_reviews {
            self.store_recount(reviewable).await?;
        }
        if config.cache.average_rating {
            let average = self.compute_average(reviewable, config).await?;
            self.repo.store_cached_average(reviewable, average).await?;
        }
        Ok(())
    }

    pub async fn compute_total(&self, reviewable: &ReviewableRef) -> anyhow::Result<i64> {
        self.repo.count_reviews(&ReviewQuery::on(reviewable)).await
    }

    /// Average of the non-null ratings rounded to the type's precision, or
    /// `0.0` when nothing has been rated.
    pub async fn compute_average(&self, reviewable: &ReviewableRef, config: &ReviewableConfig) -> anyhow::Result<f64> {
        let average = self.repo.average_rating(&ReviewQuery::on(reviewable).with_a_rating()).await?;
        Ok(round_to(average.unwrap_or(0.0), config.precision))
    }

    async fn store_recount(&self, reviewable: &ReviewableRef) -> anyhow::Result<()> {
        let total = self.compute_total(reviewable).await?;
        self.repo.store_cached_total(reviewable, total).await
    }
}
