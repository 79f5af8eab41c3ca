//! # ReviewError
//!
//! Centralized error handling for the review engine.
//! Validation failures and persistence failures are kept apart so callers can
//! decide what is worth retrying.

use std::fmt;

use thiserror::Error;
use tracing::{error, warn};

/// The primary error type for all rv-core operations.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// Bad scale, precision or unknown reviewable type at registration/lookup.
    #[error("invalid config value: {0}")]
    InvalidConfigValue(String),

    /// Missing, malformed or forbidden reviewer identity.
    #[error("invalid reviewer: {0}")]
    InvalidReviewer(String),

    /// Rating outside of the configured scale.
    #[error("invalid rating value: {value} not in [{scale}]")]
    InvalidReviewValue { value: String, scale: String },

    /// Storage failure while writing a review or refreshing cached aggregates.
    #[error("could not {action} on {reviewable} by {reviewer}: {source}")]
    Record {
        action: String,
        reviewable: String,
        reviewer: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ReviewError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(%message, "rejected reviewable configuration");
        Self::InvalidConfigValue(message)
    }

    pub fn invalid_reviewer(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(%message, "rejected reviewer identity");
        Self::InvalidReviewer(message)
    }

    pub fn invalid_value(value: impl fmt::Display, scale: &[f64]) -> Self {
        let value = value.to_string();
        let scale = scale.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>().join(", ");
        warn!(%value, %scale, "rejected rating value");
        Self::InvalidReviewValue { value, scale }
    }

    /// Wraps a storage failure with the context needed to diagnose it.
    pub fn record(
        action: impl Into<String>,
        reviewable: impl fmt::Display,
        reviewer: impl fmt::Display,
        source: anyhow::Error,
    ) -> Self {
        let action = action.into();
        let reviewable = reviewable.to_string();
        let reviewer = reviewer.to_string();
        error!(%action, %reviewable, %reviewer, error = %source, "review record failure");
        Self::Record { action, reviewable, reviewer, source }
    }

    /// Validation kinds are surfaced as-is and never worth retrying.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Record { .. })
    }
}

/// A specialized Result type for review logic.
pub type Result<T> = std::result::Result<T, ReviewError>;
