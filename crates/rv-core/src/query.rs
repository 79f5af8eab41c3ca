//! # Review Queries
//!
//! Composable read predicates over reviews. Storage plugins translate a
//! `ReviewQuery` into their own query language; every filter is ANDed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Identity, ReviewableRef};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RatingMatch {
    Exact(f64),
    /// Inclusive on both ends.
    Between(f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReviewFilter {
    On(ReviewableRef),
    By(Identity),
    OfReviewableType(String),
    ByReviewerType(String),
    Since(DateTime<Utc>),
    /// Inclusive creation-time window.
    Between(DateTime<Utc>, DateTime<Utc>),
    WithRating(RatingMatch),
    WithARating,
    WithoutARating,
    /// Non-empty body.
    WithABody,
    WithoutABody,
    /// Has both a rating and a non-empty body.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewOrder {
    /// Oldest first.
    InOrder,
    MostRecent,
    LowestRating,
    HighestRating,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewQuery {
    pub filters: Vec<ReviewFilter>,
    pub order: Option<ReviewOrder>,
    pub limit: Option<i64>,
}

impl ReviewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reviews on one reviewable.
    pub fn on(reviewable: &ReviewableRef) -> Self {
        Self::new().filter(ReviewFilter::On(reviewable.clone()))
    }

    /// All reviews written by one identity.
    pub fn by(identity: &Identity) -> Self {
        Self::new().filter(ReviewFilter::By(identity.clone()))
    }

    pub fn filter(mut self, filter: ReviewFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn and_by(self, identity: &Identity) -> Self {
        self.filter(ReviewFilter::By(identity.clone()))
    }

    pub fn of_reviewable_type(self, kind: impl Into<String>) -> Self {
        self.filter(ReviewFilter::OfReviewableType(kind.into()))
    }

    pub fn by_reviewer_type(self, kind: impl Into<String>) -> Self {
        self.filter(ReviewFilter::ByReviewerType(kind.into()))
    }

    pub fn since(self, at: DateTime<Utc>) -> Self {
        self.filter(ReviewFilter::Since(at))
    }

    pub fn between_dates(self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.filter(ReviewFilter::Between(from, to))
    }

    pub fn with_rating(self, rating: RatingMatch) -> Self {
        self.filter(ReviewFilter::WithRating(rating))
    }

    pub fn with_a_rating(self) -> Self {
        self.filter(ReviewFilter::WithARating)
    }

    pub fn without_a_rating(self) -> Self {
        self.filter(ReviewFilter::WithoutARating)
    }

    pub fn with_a_body(self) -> Self {
        self.filter(ReviewFilter::WithABody)
    }

    pub fn without_a_body(self) -> Self {
        self.filter(ReviewFilter::WithoutABody)
    }

    pub fn complete(self) -> Self {
        self.filter(ReviewFilter::Complete)
    }

    pub fn ordered(mut self, order: ReviewOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn in_order(self) -> Self {
        self.ordered(ReviewOrder::InOrder)
    }

    pub fn most_recent(self) -> Self {
        self.ordered(ReviewOrder::MostRecent)
    }

    pub fn lowest_rating(self) -> Self {
        self.ordered(ReviewOrder::LowestRating)
    }

    pub fn highest_rating(self) -> Self {
        self.ordered(ReviewOrder::HighestRating)
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    /// The `n` most recently created reviews.
    pub fn recent(self, n: i64) -> Self {
        self.most_recent().limit(n)
    }

    /// The same predicates without ordering or limit, as used for aggregates.
    pub fn unpaged(&self) -> Self {
        Self { filters: self.filters.clone(), order: None, limit: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_compose_in_order() {
        let post = ReviewableRef::new("post", 1);
        let query = ReviewQuery::on(&post).with_a_rating().complete().recent(5);

        assert_eq!(
            query.filters,
            vec![ReviewFilter::On(post), ReviewFilter::WithARating, ReviewFilter::Complete]
        );
        assert_eq!(query.order, Some(ReviewOrder::MostRecent));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_unpaged_drops_order_and_limit() {
        let query = ReviewQuery::new().by_reviewer_type("user").highest_rating().limit(3);
        let unpaged = query.unpaged();
        assert_eq!(unpaged.filters, query.filters);
        assert!(unpaged.order.is_none());
        assert!(unpaged.limit.is_none());
    }
}
