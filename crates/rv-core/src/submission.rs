//! # Submissions
//!
//! Splits a loosely-typed submission object (as it arrives from a form or a
//! JSON body) into reviewer identifiers and review fields. Association keys
//! are reserved and never become custom fields.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, ReviewError};
use crate::identity::Identifiers;
use crate::models::ReviewFields;

const IDENTIFIER_KEYS: [&str; 4] = ["reviewer", "user", "account", "ip"];

pub const RESERVED_FIELDS: [&str; 8] = [
    "id",
    "reviewable_id",
    "reviewable_type",
    "reviewer_id",
    "reviewer_type",
    "ip",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub identifiers: Identifiers,
    pub fields: ReviewFields,
}

impl Submission {
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(ReviewError::invalid_reviewer(format!(
                "submission must be an object, got {value}"
            )));
        };

        let mut identifiers = Map::new();
        let mut fields = ReviewFields::default();
        for (key, value) in map {
            if IDENTIFIER_KEYS.contains(&key.as_str()) {
                identifiers.insert(key, value);
            } else if key == "rating" {
                fields.rating = parse_rating(value)?;
            } else if key == "body" {
                fields.body = parse_body(value);
            } else if RESERVED_FIELDS.contains(&key.as_str()) {
                debug!(field = %key, "ignoring reserved field in submission");
            } else {
                fields.custom_fields.insert(key, value);
            }
        }

        let identifiers = serde_json::from_value(Value::Object(identifiers))
            .map_err(|e| ReviewError::invalid_reviewer(format!("reviewer is of wrong type: {e}")))?;
        Ok(Self { identifiers, fields })
    }
}

fn parse_rating(value: Value) -> Result<Option<f64>> {
    match &value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse().map(Some).map_err(|_| ReviewError::invalid_value(&value, &[])),
        _ => Err(ReviewError::invalid_value(&value, &[])),
    }
}

fn parse_body(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Candidate;
    use crate::models::ReviewerRef;
    use serde_json::json;

    #[test]
    fn test_splits_identifiers_and_fields() {
        let submission = Submission::from_json(json!({
            "reviewer": { "type": "user", "id": 2 },
            "rating": 4,
            "body": "Solid.",
            "title": "My title",
        }))
        .unwrap();

        assert_eq!(
            submission.identifiers.reviewer,
            Some(Candidate::Entity(ReviewerRef::new("user", 2)))
        );
        assert_eq!(submission.fields.rating, Some(4.0));
        assert_eq!(submission.fields.body.as_deref(), Some("Solid."));
        assert_eq!(submission.fields.custom_fields.get("title"), Some(&json!("My title")));
    }

    #[test]
    fn test_reserved_fields_are_dropped() {
        let submission = Submission::from_json(json!({
            "ip": "128.0.0.1",
            "reviewable_id": 666,
            "reviewer_type": "admin",
        }))
        .unwrap();

        assert_eq!(submission.identifiers.ip, Some(Candidate::Text("128.0.0.1".into())));
        assert!(submission.fields.custom_fields.is_empty());
    }

    #[test]
    fn test_rating_parsing() {
        let s = Submission::from_json(json!({ "ip": "1.2.3.4", "rating": "2.5" })).unwrap();
        assert_eq!(s.fields.rating, Some(2.5));

        let s = Submission::from_json(json!({ "ip": "1.2.3.4", "rating": null })).unwrap();
        assert_eq!(s.fields.rating, None);

        let err = Submission::from_json(json!({ "ip": "1.2.3.4", "rating": "five" })).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidReviewValue { .. }));
    }

    #[test]
    fn test_malformed_reviewer_is_rejected() {
        let err = Submission::from_json(json!({ "reviewer": 42 })).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidReviewer(_)));

        let err = Submission::from_json(json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidReviewer(_)));
    }
}
