//! # rv-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rv-core` domain models.
//!
//! Reviews live in a single `reviews` table. Each reviewable type lives in its
//! own table (by default the type name plus `s`); the optional columns
//! `cached_total_reviews` and `cached_average_rating` on that table hold the
//! cached aggregates.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rv_core::models::{
    CacheCapability, CachedAggregates, Identity, Review, ReviewableRef, ReviewerRef,
};
use rv_core::query::{RatingMatch, ReviewFilter, ReviewOrder, ReviewQuery};
use rv_core::traits::ReviewRepo;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

pub const TOTAL_COLUMN: &str = "cached_total_reviews";
pub const AVERAGE_COLUMN: &str = "cached_average_rating";

const REVIEW_COLUMNS: &str = "id, reviewable_type, reviewable_id, reviewer_type, reviewer_id, ip, \
     rating, body, custom_fields, created_at, updated_at";

const SCHEMA: [&str; 5] = [
    r#"CREATE TABLE IF NOT EXISTS reviews (
        id              BLOB PRIMARY KEY,
        reviewable_type TEXT NOT NULL,
        reviewable_id   INTEGER NOT NULL,
        reviewer_type   TEXT,
        reviewer_id     INTEGER,
        ip              TEXT,
        rating          REAL,
        body            TEXT,
        custom_fields   TEXT NOT NULL DEFAULT '{}',
        created_at      INTEGER NOT NULL,
        updated_at      INTEGER NOT NULL,
        CHECK ((reviewer_id IS NULL) <> (ip IS NULL))
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_reviews_reviewer ON reviews (reviewer_id, reviewer_type)",
    "CREATE INDEX IF NOT EXISTS idx_reviews_reviewable ON reviews (reviewable_id, reviewable_type)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_reviews_reviewer ON reviews \
     (reviewable_type, reviewable_id, reviewer_type, reviewer_id) WHERE reviewer_id IS NOT NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_reviews_ip ON reviews \
     (reviewable_type, reviewable_id, ip) WHERE ip IS NOT NULL",
];

pub struct SqliteReviewRepo {
    pool: SqlitePool,
    /// Reviewable type -> table name overrides.
    tables: HashMap<String, String>,
    /// Cache columns found per reviewable type, probed once.
    capabilities: DashMap<String, CacheCapability>,
}

// Helper for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Uuid::from_slice(blob).context("malformed review id")
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| anyhow!("timestamp {micros} out of range"))
}

/// Table names cannot be bound as parameters, so only plain identifiers pass.
fn checked_identifier(name: &str) -> anyhow::Result<&str> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("`{name}` is not a valid table name");
    }
    Ok(name)
}

impl SqliteReviewRepo {
    /// Connects to `url` (e.g. `sqlite://reviews.db` or `sqlite::memory:`) and
    /// creates the review schema if missing.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        Self::connect(url, 5).await
    }

    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open {url}"))?;

        let repo = Self::from_pool(pool);
        repo.init_schema().await?;
        Ok(repo)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool, tables: HashMap::new(), capabilities: DashMap::new() }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Maps a reviewable type to the table its entities live in.
    pub fn with_table(mut self, reviewable_type: &str, table: &str) -> anyhow::Result<Self> {
        checked_identifier(table)?;
        self.tables.insert(reviewable_type.to_string(), table.to_string());
        Ok(self)
    }

    /// Creates the `reviews` table and its indexes.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to create review schema")?;
        }
        info!("review schema ready");
        Ok(())
    }

    fn table_for(&self, reviewable_type: &str) -> anyhow::Result<String> {
        match self.tables.get(reviewable_type) {
            Some(table) => Ok(table.clone()),
            None => Ok(checked_identifier(&format!("{reviewable_type}s"))?.to_string()),
        }
    }

    async fn probe(&self, reviewable_type: &str) -> anyhow::Result<CacheCapability> {
        let table = self.table_for(reviewable_type)?;
        let columns: Vec<String> = sqlx::query(&format!("PRAGMA table_info(\"{table}\")"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        let capability = CacheCapability {
            total_reviews: columns.iter().any(|c| c == TOTAL_COLUMN),
            average_rating: columns.iter().any(|c| c == AVERAGE_COLUMN),
        };
        debug!(reviewable_type, %table, ?capability, "probed cache columns");
        self.capabilities.insert(reviewable_type.to_string(), capability);
        Ok(capability)
    }

    async fn known_capability(&self, reviewable_type: &str) -> anyhow::Result<CacheCapability> {
        // Copy out before awaiting so no shard lock is held across the column lookup.
        let known = self.capabilities.get(reviewable_type).map(|c| *c);
        match known {
            Some(capability) => Ok(capability),
            None => self.probe(reviewable_type).await,
        }
    }

    async fn update_cache_column<T>(&self, reviewable: &ReviewableRef, column: &str, value: T) -> anyhow::Result<()>
    where
        T: for<'q> sqlx::Encode<'q, Sqlite> + sqlx::Type<Sqlite> + Send + 'static,
    {
        let table = self.table_for(&reviewable.kind)?;
        let result = sqlx::query(&format!("UPDATE \"{table}\" SET {column} = ? WHERE id = ?"))
            .bind(value)
            .bind(reviewable.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("{reviewable} has no row in {table}");
        }
        Ok(())
    }
}

fn review_from_row(row: &SqliteRow) -> anyhow::Result<Review> {
    let id = blob_to_uuid(row.get::<Vec<u8>, _>("id").as_slice())?;
    let reviewer = match (row.get::<Option<i64>, _>("reviewer_id"), row.get::<Option<String>, _>("ip")) {
        (Some(reviewer_id), _) => Identity::Reviewer(ReviewerRef {
            kind: row.get::<Option<String>, _>("reviewer_type").unwrap_or_default(),
            id: reviewer_id,
        }),
        (None, Some(ip)) => Identity::Ip(ip),
        (None, None) => bail!("review {id} has neither reviewer nor ip"),
    };

    Ok(Review {
        id,
        reviewable: ReviewableRef { kind: row.get("reviewable_type"), id: row.get("reviewable_id") },
        reviewer,
        rating: row.get("rating"),
        body: row.get("body"),
        custom_fields: serde_json::from_str(&row.get::<String, _>("custom_fields"))
            .with_context(|| format!("review {id} has malformed custom fields"))?,
        created_at: from_micros(row.get("created_at"))?,
        updated_at: from_micros(row.get("updated_at"))?,
    })
}

/// Appends the WHERE clause for `query`. Every filter is ANDed.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ReviewQuery) {
    qb.push(" WHERE 1 = 1");
    for filter in &query.filters {
        qb.push(" AND ");
        match filter {
            ReviewFilter::On(reviewable) => {
                qb.push("reviewable_type = ").push_bind(reviewable.kind.clone());
                qb.push(" AND reviewable_id = ").push_bind(reviewable.id);
            }
            ReviewFilter::By(Identity::Reviewer(reviewer)) => {
                qb.push("reviewer_type = ").push_bind(reviewer.kind.clone());
                qb.push(" AND reviewer_id = ").push_bind(reviewer.id);
            }
            ReviewFilter::By(Identity::Ip(ip)) => {
                qb.push("ip = ").push_bind(ip.clone());
            }
            ReviewFilter::OfReviewableType(kind) => {
                qb.push("reviewable_type = ").push_bind(kind.clone());
            }
            ReviewFilter::ByReviewerType(kind) => {
                qb.push("reviewer_type = ").push_bind(kind.clone());
            }
            ReviewFilter::Since(at) => {
                qb.push("created_at >= ").push_bind(to_micros(*at));
            }
            ReviewFilter::Between(from, to) => {
                qb.push("created_at BETWEEN ").push_bind(to_micros(*from));
                qb.push(" AND ").push_bind(to_micros(*to));
            }
            ReviewFilter::WithRating(RatingMatch::Exact(value)) => {
                qb.push("ABS(rating - ").push_bind(*value).push(") < 1e-9");
            }
            ReviewFilter::WithRating(RatingMatch::Between(low, high)) => {
                qb.push("rating BETWEEN ").push_bind(*low);
                qb.push(" AND ").push_bind(*high);
            }
            ReviewFilter::WithARating => {
                qb.push("rating IS NOT NULL");
            }
            ReviewFilter::WithoutARating => {
                qb.push("rating IS NULL");
            }
            ReviewFilter::WithABody => {
                qb.push("(body IS NOT NULL AND LENGTH(body) > 0)");
            }
            ReviewFilter::WithoutABody => {
                qb.push("(body IS NULL OR LENGTH(body) = 0)");
            }
            ReviewFilter::Complete => {
                qb.push("(rating IS NOT NULL AND body IS NOT NULL AND LENGTH(body) > 0)");
            }
        }
    }
}

fn push_order_and_limit(qb: &mut QueryBuilder<'_, Sqlite>, query: &ReviewQuery) {
    let order = match query.order.unwrap_or(ReviewOrder::InOrder) {
        ReviewOrder::InOrder => "created_at ASC, rowid ASC",
        ReviewOrder::MostRecent => "created_at DESC, rowid DESC",
        ReviewOrder::LowestRating => "rating ASC, created_at ASC",
        ReviewOrder::HighestRating => "rating DESC, created_at ASC",
    };
    qb.push(" ORDER BY ").push(order);
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
}

#[async_trait]
impl ReviewRepo for SqliteReviewRepo {
    async fn cache_capability(&self, reviewable_type: &str) -> anyhow::Result<CacheCapability> {
        self.probe(reviewable_type).await
    }

    async fn find_review(&self, reviewable: &ReviewableRef, identity: &Identity) -> anyhow::Result<Option<Review>> {
        let query = ReviewQuery::on(reviewable).and_by(identity);
        let mut qb = QueryBuilder::new(format!("SELECT {REVIEW_COLUMNS} FROM reviews"));
        push_filters(&mut qb, &query);
        qb.push(" LIMIT 1");

        qb.build()
            .fetch_optional(&self.pool)
            .await?
            .map(|row| review_from_row(&row))
            .transpose()
    }

    async fn insert_review(&self, review: &Review) -> anyhow::Result<()> {
        let (reviewer_type, reviewer_id, ip) = match &review.reviewer {
            Identity::Reviewer(r) => (Some(r.kind.clone()), Some(r.id), None),
            Identity::Ip(ip) => (None, None, Some(ip.clone())),
        };

        sqlx::query(&format!(
            "INSERT INTO reviews ({REVIEW_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(uuid_to_blob(review.id))
        .bind(&review.reviewable.kind)
        .bind(review.reviewable.id)
        .bind(reviewer_type)
        .bind(reviewer_id)
        .bind(ip)
        .bind(review.rating)
        .bind(&review.body)
        .bind(serde_json::to_string(&review.custom_fields)?)
        .bind(to_micros(review.created_at))
        .bind(to_micros(review.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_review(&self, review: &Review) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE reviews SET rating = ?, body = ?, custom_fields = ?, updated_at = ? WHERE id = ?",
        )
        .bind(review.rating)
        .bind(&review.body)
        .bind(serde_json::to_string(&review.custom_fields)?)
        .bind(to_micros(review.updated_at))
        .bind(uuid_to_blob(review.id))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("review {} not found", review.id);
        }
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_reviews(&self, query: &ReviewQuery) -> anyhow::Result<u64> {
        let mut qb = QueryBuilder::new("DELETE FROM reviews");
        push_filters(&mut qb, query);
        Ok(qb.build().execute(&self.pool).await?.rows_affected())
    }

    async fn list_reviews(&self, query: &ReviewQuery) -> anyhow::Result<Vec<Review>> {
        let mut qb = QueryBuilder::new(format!("SELECT {REVIEW_COLUMNS} FROM reviews"));
        push_filters(&mut qb, query);
        push_order_and_limit(&mut qb, query);

        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(review_from_row)
            .collect()
    }

    async fn count_reviews(&self, query: &ReviewQuery) -> anyhow::Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM reviews");
        push_filters(&mut qb, query);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn average_rating(&self, query: &ReviewQuery) -> anyhow::Result<Option<f64>> {
        let mut qb = QueryBuilder::new("SELECT AVG(rating) FROM reviews");
        push_filters(&mut qb, query);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get::<Option<f64>, _>(0))
    }

    async fn reviewable_ids(&self, reviewable_type: &str) -> anyhow::Result<Vec<i64>> {
        let table = self.table_for(reviewable_type)?;
        let rows = sqlx::query(&format!("SELECT id FROM \"{table}\" ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to list {table}"))?;
        Ok(rows.iter().map(|row| row.get::<i64, _>(0)).collect())
    }

    async fn cached_aggregates(&self, reviewable: &ReviewableRef) -> anyhow::Result<CachedAggregates> {
        let capability = self.known_capability(&reviewable.kind).await?;
        if !capability.any() {
            return Ok(CachedAggregates::default());
        }

        let table = self.table_for(&reviewable.kind)?;
        let total = if capability.total_reviews { TOTAL_COLUMN } else { "NULL" };
        let average = if capability.average_rating { AVERAGE_COLUMN } else { "NULL" };
        let row = sqlx::query(&format!("SELECT {total}, {average} FROM \"{table}\" WHERE id = ?"))
            .bind(reviewable.id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| CachedAggregates {
                total_reviews: row.get::<Option<i64>, _>(0),
                average_rating: row.get::<Option<f64>, _>(1),
            })
            .unwrap_or_default())
    }

    async fn increment_cached_total(&self, reviewable: &ReviewableRef, delta: i64) -> anyhow::Result<bool> {
        let table = self.table_for(&reviewable.kind)?;
        let result = sqlx::query(&format!(
            "UPDATE \"{table}\" SET {TOTAL_COLUMN} = {TOTAL_COLUMN} + ? \
             WHERE id = ? AND {TOTAL_COLUMN} IS NOT NULL AND {TOTAL_COLUMN} + ? >= 0"
        ))
        .bind(delta)
        .bind(reviewable.id)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn store_cached_total(&self, reviewable: &ReviewableRef, total: i64) -> anyhow::Result<()> {
        self.update_cache_column(reviewable, TOTAL_COLUMN, total).await
    }

    async fn store_cached_average(&self, reviewable: &ReviewableRef, average: f64) -> anyhow::Result<()> {
        self.update_cache_column(reviewable, AVERAGE_COLUMN, average).await
    }
}
