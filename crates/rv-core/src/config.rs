//! # Reviewable Configuration
//!
//! `ReviewableSpec` is what a caller (or a config file) asks for when making a
//! type reviewable; `ReviewableConfig` is the validated, immutable result.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ReviewError};
use crate::models::CacheCapability;
use crate::scale::{Scale, ScaleSpec};

pub const DEFAULT_REVIEWER_TYPE: &str = "user";

/// One reviewer type or several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewerTypes {
    One(String),
    Many(Vec<String>),
}

impl Default for ReviewerTypes {
    fn default() -> Self {
        Self::One(DEFAULT_REVIEWER_TYPE.to_string())
    }
}

impl ReviewerTypes {
    /// Normalized (trimmed, lowercased, singular) and de-duplicated, in order.
    pub fn normalized(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::One(t) => vec![t.as_str()],
            Self::Many(ts) => ts.iter().map(String::as_str).collect(),
        };
        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for kind in raw.into_iter().map(normalize_reviewer_type) {
            if !kind.is_empty() && !out.contains(&kind) {
                out.push(kind);
            }
        }
        out
    }
}

/// Registration options for a reviewable type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewableSpec {
    /// Reviewer types allowed to review, e.g. `"user"` or `["account", "user"]`.
    pub by: ReviewerTypes,
    #[serde(alias = "range", alias = "values")]
    pub scale: Option<ScaleSpec>,
    pub step: Option<f64>,
    pub steps: Option<f64>,
    #[serde(alias = "total_precision", alias = "average_precision")]
    pub precision: Option<i64>,
    #[serde(alias = "anonymous")]
    pub accept_ip: bool,
}

/// Validated per-type settings. Never mutated after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewableConfig {
    pub reviewable_type: String,
    pub scale: Scale,
    pub precision: u32,
    pub permitted_reviewer_types: Vec<String>,
    pub accept_anonymous_ip: bool,
    pub cache: CacheCapability,
}

impl ReviewableConfig {
    pub fn from_spec(reviewable_type: &str, spec: &ReviewableSpec, cache: CacheCapability) -> Result<Self> {
        let scale = Scale::build(&spec.scale.clone().unwrap_or_default(), spec.step, spec.steps)?;
        let precision = match spec.precision {
            None => scale.default_precision(),
            Some(p) => u32::try_from(p).map_err(|_| {
                ReviewError::invalid_config(format!("precision must be a non-negative integer, got {p}"))
            })?,
        };

        Ok(Self {
            reviewable_type: reviewable_type.to_string(),
            scale,
            precision,
            permitted_reviewer_types: spec.by.normalized(),
            accept_anonymous_ip: spec.accept_ip,
            cache,
        })
    }

    /// `reviewer_type` is compared in canonical form, so `"Users"` matches `"user"`.
    pub fn permits(&self, reviewer_type: &str) -> bool {
        let reviewer_type = normalize_reviewer_type(reviewer_type);
        self.permitted_reviewer_types.iter().any(|t| *t == reviewer_type)
    }

    pub fn rating_scale(&self) -> &[f64] {
        self.scale.values()
    }

    pub fn rating_precision(&self) -> u32 {
        self.precision
    }

    pub fn is_valid_rating(&self, values: &[f64]) -> bool {
        self.scale.is_valid_rating(values)
    }
}

/// Canonical reviewer type: trimmed, lowercased and singular.
pub fn normalize_reviewer_type(kind: &str) -> String {
    singularize(&kind.trim().to_lowercase())
}

/// `users` -> `user`, `categories` -> `category`; anything else is kept.
fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{stem}y")
    } else if word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ReviewableConfig::from_spec("post", &ReviewableSpec::default(), CacheCapability::NONE).unwrap();
        assert_eq!(config.rating_scale(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(config.rating_precision(), 1);
        assert_eq!(config.permitted_reviewer_types, vec!["user".to_string()]);
        assert!(!config.accept_anonymous_ip);
    }

    #[test]
    fn test_spec_from_json_with_aliases() {
        let spec: ReviewableSpec = serde_json::from_value(json!({
            "by": "users",
            "range": { "first": 1.0, "last": 5.0 },
            "step": 0.5,
            "average_precision": 2,
            "anonymous": true,
        }))
        .unwrap();
        let config = ReviewableConfig::from_spec("post", &spec, CacheCapability::ALL).unwrap();
        assert_eq!(config.rating_scale().len(), 9);
        assert_eq!(config.precision, 2);
        assert!(config.accept_anonymous_ip);
        assert!(config.permits("user"));
    }

    #[test]
    fn test_values_list_and_many_reviewer_types() {
        let spec: ReviewableSpec = serde_json::from_value(json!({
            "by": ["Accounts", "users", "users"],
            "values": [1, 2, 3],
        }))
        .unwrap();
        let config = ReviewableConfig::from_spec("article", &spec, CacheCapability::NONE).unwrap();
        assert_eq!(config.permitted_reviewer_types, vec!["account".to_string(), "user".to_string()]);
        assert!(config.is_valid_rating(&[3.0]));
        assert!(!config.is_valid_rating(&[4.0]));
    }

    #[test]
    fn test_negative_precision_is_rejected() {
        let spec = ReviewableSpec { precision: Some(-1), ..ReviewableSpec::default() };
        let err = ReviewableConfig::from_spec("post", &spec, CacheCapability::NONE).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidConfigValue(_)));
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boss"), "boss");
        assert_eq!(singularize("account"), "account");
    }
}
