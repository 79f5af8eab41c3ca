//! # Domain Models
//!
//! These structs represent the core entities of the review engine.
//! Reviews use UUID v7 for time-ordered, globally unique identification;
//! reviewables and reviewers are external entities addressed by type + id.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Reference to an entity that can receive reviews (e.g. a post or article).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewableRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
}

impl ReviewableRef {
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self { kind: kind.into(), id }
    }
}

impl fmt::Display for ReviewableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Reference to an identified reviewer (e.g. a user or account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewerRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
}

impl ReviewerRef {
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self { kind: kind.into(), id }
    }
}

impl fmt::Display for ReviewerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// The resolved, canonical answer to "who is reviewing".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Reviewer(ReviewerRef),
    /// Normalized (trimmed) dotted-quad address.
    Ip(String),
}

impl Identity {
    pub fn reviewer_type(&self) -> Option<&str> {
        match self {
            Identity::Reviewer(r) => Some(&r.kind),
            Identity::Ip(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Reviewer(r) => r.fmt(f),
            Identity::Ip(ip) => write!(f, "ip:{ip}"),
        }
    }
}

/// A single review. At most one exists per (reviewable, reviewer identity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub reviewable: ReviewableRef,
    pub reviewer: Identity,
    pub rating: Option<f64>,
    pub body: Option<String>,
    /// Caller-supplied extra attributes (title, mood, ...)
    pub custom_fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(reviewable: ReviewableRef, reviewer: Identity) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            reviewable,
            reviewer,
            rating: None,
            body: None,
            custom_fields: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn reviewed_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn has_body(&self) -> bool {
        self.body.as_deref().is_some_and(|b| !b.is_empty())
    }

    /// Overwrites the updatable fields. Association fields are left alone.
    pub fn apply(&mut self, fields: ReviewFields) {
        self.rating = fields.rating;
        self.body = fields.body;
        self.custom_fields.extend(fields.custom_fields);
        self.updated_at = Utc::now();
    }
}

/// The updatable part of a review as supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFields {
    pub rating: Option<f64>,
    pub body: Option<String>,
    #[serde(default)]
    pub custom_fields: Map<String, Value>,
}

impl ReviewFields {
    pub fn rated(rating: f64) -> Self {
        Self { rating: Some(rating), ..Self::default() }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }
}

/// Which cached aggregate columns a reviewable type's storage carries.
/// Probed once when the type is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCapability {
    pub total_reviews: bool,
    pub average_rating: bool,
}

impl CacheCapability {
    pub const NONE: Self = Self { total_reviews: false, average_rating: false };
    pub const ALL: Self = Self { total_reviews: true, average_rating: true };

    pub fn any(&self) -> bool {
        self.total_reviews || self.average_rating
    }
}

/// Denormalized values as currently stored on a reviewable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedAggregates {
    pub total_reviews: Option<i64>,
    pub average_rating: Option<f64>,
}
