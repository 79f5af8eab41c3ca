//! Recomputes the cached review aggregates of every configured reviewable
//! type, or of the types named on the command line.
//!
//! Usage: `refresh-aggregates [--config PATH] [TYPE ...]`

mod cli;

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use configs::{telemetry, AppConfig};
use rv_core::ReviewService;
use rv_db_sqlite::SqliteReviewRepo;
use secrecy::ExposeSecret;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // 1. Configuration and logging
    let config = AppConfig::load_with(cli.config.as_deref()).context("failed to load configuration")?;
    telemetry::init_tracing(&config.logging);

    // 2. Storage and registered reviewable types
    let repo = SqliteReviewRepo::connect(config.database.url.expose_secret(), config.database.max_connections).await?;
    let service = ReviewService::new(Arc::new(repo));
    for (reviewable_type, spec) in &config.reviewables {
        service.configure(reviewable_type, spec).await?;
    }

    // 3. Recompute
    let types = if cli.types.is_empty() {
        service.registry().reviewable_types()
    } else {
        cli.types
    };
    if types.is_empty() {
        bail!("no reviewable types configured");
    }

    let mut total = 0;
    for reviewable_type in &types {
        let refreshed = service.refresh_all(reviewable_type).await?;
        info!(%reviewable_type, refreshed, "aggregates refreshed");
        total += refreshed;
    }
    info!(types = types.len(), total, "done");
    Ok(())
}
