//! # Identity Resolution
//!
//! Turns the identifiers a caller supplied into a single canonical reviewer
//! identity, checked against the target type's policy. Resolution is pure:
//! the same input always gives the same answer and nothing is touched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{normalize_reviewer_type, ReviewableConfig};
use crate::error::{Result, ReviewError};
use crate::models::{Identity, ReviewerRef};

/// Basic `#.#.#.#` shape check; octet ranges are not validated.
static DOTTED_QUAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("valid IP pattern"));

/// A value offered as a reviewer before it has been validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Candidate {
    Entity(ReviewerRef),
    Text(String),
}

/// The identifier keys a caller may use. The first present one wins, in the
/// order `reviewer`, `user`, `account`, `ip`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Candidate>,
}

impl Identifiers {
    pub fn reviewer(reviewer: ReviewerRef) -> Self {
        Self { reviewer: Some(Candidate::Entity(reviewer)), ..Self::default() }
    }

    pub fn ip(ip: impl Into<String>) -> Self {
        Self { ip: Some(Candidate::Text(ip.into())), ..Self::default() }
    }

    /// The candidate that resolution will look at, skipping blank strings.
    pub fn candidate(&self) -> Option<&Candidate> {
        [&self.reviewer, &self.user, &self.account, &self.ip]
            .into_iter()
            .flatten()
            .find(|c| !matches!(c, Candidate::Text(t) if t.trim().is_empty()))
    }
}

impl From<ReviewerRef> for Identifiers {
    fn from(reviewer: ReviewerRef) -> Self {
        Self::reviewer(reviewer)
    }
}

impl From<&Identity> for Identifiers {
    fn from(identity: &Identity) -> Self {
        match identity {
            Identity::Reviewer(r) => Self::reviewer(r.clone()),
            Identity::Ip(ip) => Self::ip(ip.clone()),
        }
    }
}

pub fn is_ip(value: &str) -> bool {
    DOTTED_QUAD.is_match(value.trim())
}

/// Resolves `identifiers` into an [`Identity`] permitted by `config`.
pub fn resolve(identifiers: &Identifiers, config: &ReviewableConfig) -> Result<Identity> {
    let candidate = identifiers.candidate().ok_or_else(|| {
        ReviewError::invalid_reviewer("no reviewer object or IP provided")
    })?;

    match candidate {
        Candidate::Text(text) if is_ip(text) => {
            if !config.accept_anonymous_ip {
                return Err(ReviewError::invalid_reviewer(format!(
                    "reviewing by IP is disabled for {}",
                    config.reviewable_type
                )));
            }
            Ok(Identity::Ip(text.trim().to_string()))
        }
        Candidate::Entity(reviewer) if config.permits(&reviewer.kind) => Ok(Identity::Reviewer(ReviewerRef::new(
            normalize_reviewer_type(&reviewer.kind),
            reviewer.id,
        ))),
        Candidate::Entity(reviewer) => Err(ReviewError::invalid_reviewer(format!(
            "reviewer type `{}` may not review {} (permitted: {})",
            reviewer.kind,
            config.reviewable_type,
            config.permitted_reviewer_types.join(", ")
        ))),
        Candidate::Text(text) => Err(ReviewError::invalid_reviewer(format!(
            "reviewer is of wrong type: {text:?}"
        ))),
    }
}
