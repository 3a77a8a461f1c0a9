//! Database module: PostgreSQL pool, row models and SQL repositories.
//!
//! - `model`: rows returned by repository queries.
//! - `repo`: SQL-only functions taking a [`Pool`].
//!
//! [`AnimeStore`] is the seam the update cycle talks to; [`PgStore`] is the
//! production implementation backed by `repo`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::model::{AnimeRecord, UpsertReport};

pub mod model;
pub mod repo;

pub use model::{StoredAnime, TrackedPage};
pub use repo::*;

pub type Pool = PgPool;

const MAX_CONNECTIONS: u32 = 10;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    info!("connected to PostgreSQL");
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to apply bootstrap schema")?;
    Ok(())
}

#[async_trait]
pub trait AnimeStore: Send + Sync {
    /// Page that should be refreshed next, if any, ignoring `exclude`.
    async fn page_to_fetch(&self, exclude: &[i32]) -> Result<Option<i32>>;

    /// Insert or overwrite every record, keyed by AniList id.
    async fn upsert_batch(&self, records: &[AnimeRecord]) -> Result<UpsertReport>;

    /// Start tracking pages up to and including `last_page`. Returns how many were added.
    async fn track_pages(&self, last_page: i32) -> Result<u64>;

    async fn schedule_page(&self, page: i32, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("disconnected from PostgreSQL");
    }
}

#[async_trait]
impl AnimeStore for PgStore {
    async fn page_to_fetch(&self, exclude: &[i32]) -> Result<Option<i32>> {
        repo::page_to_fetch(&self.pool, exclude).await
    }

    async fn upsert_batch(&self, records: &[AnimeRecord]) -> Result<UpsertReport> {
        repo::upsert_batch(&self.pool, records).await
    }

    async fn track_pages(&self, last_page: i32) -> Result<u64> {
        repo::track_pages(&self.pool, last_page).await
    }

    async fn schedule_page(&self, page: i32, at: DateTime<Utc>) -> Result<()> {
        repo::schedule_page(&self.pool, page, at).await
    }
}
