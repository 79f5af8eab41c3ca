//! Shared fixtures for the end-to-end tests: an in-memory SQLite store with a
//! `posts` table carrying both cache columns and an `articles` table without
//! any.

use std::sync::Arc;

use rv_core::{Identifiers, ReviewService, ReviewableRef, ReviewableSpec, ReviewerRef};
use rv_db_sqlite::SqliteReviewRepo;
use serde_json::json;

pub const REVIEWABLE_ROWS: i64 = 3;

pub struct Fixture {
    pub repo: Arc<SqliteReviewRepo>,
    pub service: ReviewService,
}

/// Half-star posts, reviewable by users or anonymously.
pub fn post_spec() -> ReviewableSpec {
    serde_json::from_value(json!({
        "by": "users",
        "range": { "first": 1.0, "last": 5.0 },
        "step": 0.5,
        "average_precision": 2,
        "accept_ip": true,
    }))
    .expect("valid post spec")
}

/// Three-point articles, reviewable by users and accounts only.
pub fn article_spec() -> ReviewableSpec {
    serde_json::from_value(json!({
        "by": ["users", "accounts"],
        "values": [1, 2, 3],
    }))
    .expect("valid article spec")
}

pub async fn setup() -> anyhow::Result<Fixture> {
    let repo = SqliteReviewRepo::new("sqlite::memory:").await?;
    sqlx::query(
        "CREATE TABLE posts (
            id                    INTEGER PRIMARY KEY,
            title                 TEXT NOT NULL,
            cached_total_reviews  INTEGER DEFAULT 0,
            cached_average_rating REAL
        )",
    )
    .execute(repo.pool())
    .await?;
    sqlx::query("CREATE TABLE articles (id INTEGER PRIMARY KEY, title TEXT NOT NULL)")
        .execute(repo.pool())
        .await?;
    for id in 1..=REVIEWABLE_ROWS {
        for table in ["posts", "articles"] {
            sqlx::query(&format!("INSERT INTO {table} (id, title) VALUES (?, ?)"))
                .bind(id)
                .bind(format!("{table} #{id}"))
                .execute(repo.pool())
                .await?;
        }
    }

    let repo = Arc::new(repo);
    let service = ReviewService::new(repo.clone());
    service.configure("post", &post_spec()).await?;
    service.configure("article", &article_spec()).await?;
    Ok(Fixture { repo, service })
}

pub fn post(id: i64) -> ReviewableRef {
    ReviewableRef::new("post", id)
}

pub fn article(id: i64) -> ReviewableRef {
    ReviewableRef::new("article", id)
}

pub fn user(id: i64) -> Identifiers {
    Identifiers::reviewer(ReviewerRef::new("user", id))
}

pub fn account(id: i64) -> Identifiers {
    Identifiers::reviewer(ReviewerRef::new("account", id))
}

pub fn ip(address: &str) -> Identifiers {
    Identifiers::ip(address)
}
