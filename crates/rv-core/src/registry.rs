//! # Reviewable Registry
//!
//! Holds one `ReviewableConfig` per reviewable type. Configs are computed on
//! registration and only read afterwards; registering a type again replaces
//! its config wholesale.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::{ReviewableConfig, ReviewableSpec};
use crate::error::{Result, ReviewError};
use crate::models::CacheCapability;

#[derive(Debug, Default)]
pub struct ReviewableRegistry {
    configs: DashMap<String, Arc<ReviewableConfig>>,
}

impl ReviewableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `spec` and stores the resulting config for `reviewable_type`.
    pub fn register(
        &self,
        reviewable_type: &str,
        spec: &ReviewableSpec,
        cache: CacheCapability,
    ) -> Result<Arc<ReviewableConfig>> {
        let config = Arc::new(ReviewableConfig::from_spec(reviewable_type, spec, cache)?);
        if self.configs.insert(reviewable_type.to_string(), config.clone()).is_some() {
            debug!(reviewable_type, "replaced existing reviewable config");
        }
        info!(
            reviewable_type,
            scale = ?config.rating_scale(),
            precision = config.precision,
            reviewers = ?config.permitted_reviewer_types,
            accept_ip = config.accept_anonymous_ip,
            cache = ?config.cache,
            "registered reviewable type"
        );
        Ok(config)
    }

    pub fn is_registered(&self, reviewable_type: &str) -> bool {
        self.configs.contains_key(reviewable_type)
    }

    pub fn config_for(&self, reviewable_type: &str) -> Option<Arc<ReviewableConfig>> {
        self.configs.get(reviewable_type).map(|entry| entry.value().clone())
    }

    /// Like [`config_for`](Self::config_for) but an unknown type is an error.
    pub fn require(&self, reviewable_type: &str) -> Result<Arc<ReviewableConfig>> {
        self.config_for(reviewable_type).ok_or_else(|| {
            ReviewError::invalid_config(format!("`{reviewable_type}` is not registered as reviewable"))
        })
    }

    pub fn reviewable_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ScaleSpec;

    #[test]
    fn test_register_and_lookup() {
        let registry = ReviewableRegistry::new();
        assert!(!registry.is_registered("post"));
        assert!(registry.config_for("post").is_none());

        registry.register("post", &ReviewableSpec::default(), CacheCapability::NONE).unwrap();
        assert!(registry.is_registered("post"));
        assert_eq!(registry.require("post").unwrap().reviewable_type, "post");
        assert!(matches!(registry.require("page"), Err(ReviewError::InvalidConfigValue(_))));
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = ReviewableRegistry::new();
        registry.register("post", &ReviewableSpec::default(), CacheCapability::NONE).unwrap();

        let spec = ReviewableSpec {
            scale: Some(ScaleSpec::values([1.0, 2.0, 3.0])),
            accept_ip: true,
            ..ReviewableSpec::default()
        };
        registry.register("post", &spec, CacheCapability::ALL).unwrap();

        let config = registry.config_for("post").unwrap();
        assert_eq!(config.rating_scale(), &[1.0, 2.0, 3.0]);
        assert!(config.accept_anonymous_ip);
        assert_eq!(config.cache, CacheCapability::ALL);
        assert_eq!(registry.reviewable_types(), vec!["post".to_string()]);
    }

    #[test]
    fn test_failed_registration_keeps_previous_config() {
        let registry = ReviewableRegistry::new();
        registry.register("post", &ReviewableSpec::default(), CacheCapability::NONE).unwrap();

        let bad = ReviewableSpec { precision: Some(-2), ..ReviewableSpec::default() };
        assert!(registry.register("post", &bad, CacheCapability::NONE).is_err());
        assert_eq!(registry.config_for("post").unwrap().precision, 1);
    }
}
