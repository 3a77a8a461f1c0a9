//! PostgreSQL repository tests.
//!
//! Set `MAKI_TestDatabaseConnection` to a scratch database to run them; each
//! test works in its own throwaway schema. Without the variable they are skipped.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

use maki_updater::anilist::{AnimeSource, FetchError, MediaPage};
use maki_updater::db::{self, AnimeStore, PgStore};
use maki_updater::model::{AirStatus, AnimeRecord, MediaFormat};
use maki_updater::updater;

const TEST_DB_ENV: &str = "MAKI_TestDatabaseConnection";

struct Scratch {
    admin: PgPool,
    pool: PgPool,
    schema: String,
}

impl Scratch {
    async fn drop_schema(self) {
        self.pool.close().await;
        let sql = format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema);
        self.admin.execute(sql.as_str()).await.unwrap();
        self.admin.close().await;
    }
}

async fn scratch() -> Option<Scratch> {
    let Ok(url) = std::env::var(TEST_DB_ENV) else {
        eprintln!("{TEST_DB_ENV} not set; skipping PostgreSQL test");
        return None;
    };
    let admin = PgPool::connect(&url).await.unwrap();
    let schema = format!("maki_test_{}", rand::random::<u32>());
    let create = format!("CREATE SCHEMA {schema}");
    admin.execute(create.as_str()).await.unwrap();

    let search_path = format!("SET search_path TO {schema}");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .after_connect(move |conn, _meta| {
            let sql = search_path.clone();
            Box::pin(async move {
                conn.execute(sql.as_str()).await?;
                Ok(())
            })
        })
        .connect(&url)
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    Some(Scratch {
        admin,
        pool,
        schema,
    })
}

fn anime(id: i64, title: &str) -> AnimeRecord {
    AnimeRecord {
        anilist_id: id,
        mal_id: Some(id + 1000),
        title: title.to_string(),
        cover_url: Some(format!("https://img.anili.st/{id}.jpg")),
        format: Some(MediaFormat::Tv),
        status: Some(AirStatus::Releasing),
        release_year: Some(2019),
        normalized_score: Some(0.81),
        genres: vec!["action".into(), "drama".into()],
    }
}

#[tokio::test]
async fn upsert_is_last_write_wins_and_keeps_row_id() {
    let Some(scratch) = scratch().await else { return };
    let pool = &scratch.pool;

    let report = db::upsert_batch(pool, &[anime(1, "Vinland Saga"), anime(2, "Dororo")])
        .await
        .unwrap();
    assert_eq!(report.upserted, 2);
    assert_eq!(report.failed, 0);
    let first = db::find_anime(pool, 1).await.unwrap().unwrap();
    assert_eq!(first.format.as_deref(), Some("TV"));
    assert_eq!(first.status.as_deref(), Some("RELEASING"));
    assert_eq!(db::anime_genres(pool, 1).await.unwrap(), vec!["action", "drama"]);

    let mut changed = anime(1, "Vinland Saga Season 1");
    changed.status = Some(AirStatus::Finished);
    changed.format = Some(MediaFormat::Ona);
    changed.normalized_score = Some(0.88);
    changed.genres = vec!["adventure".into()];
    db::upsert_batch(pool, &[changed]).await.unwrap();

    let second = db::find_anime(pool, 1).await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.title, "Vinland Saga Season 1");
    assert_eq!(second.status.as_deref(), Some("FINISHED"));
    assert_eq!(second.format.as_deref(), Some("ONA"));
    assert_eq!(second.normalized_score, Some(0.88));
    assert_eq!(db::anime_genres(pool, 1).await.unwrap(), vec!["adventure"]);

    // the untouched record is still there
    assert_eq!(db::find_anime(pool, 2).await.unwrap().unwrap().title, "Dororo");

    scratch.drop_schema().await;
}

#[tokio::test]
async fn one_bad_record_does_not_abort_the_batch() {
    let Some(scratch) = scratch().await else { return };
    let pool = &scratch.pool;

    // PostgreSQL text cannot hold NUL bytes
    let report = db::upsert_batch(
        pool,
        &[anime(1, "Mushishi"), anime(2, "bad\0title"), anime(3, "Monster")],
    )
    .await
    .unwrap();

    assert_eq!(report.upserted, 2);
    assert_eq!(report.failed, 1);
    assert!(db::find_anime(pool, 1).await.unwrap().is_some());
    assert!(db::find_anime(pool, 2).await.unwrap().is_none());
    assert!(db::find_anime(pool, 3).await.unwrap().is_some());

    scratch.drop_schema().await;
}

#[tokio::test]
async fn page_tracking_picks_the_most_overdue_page() {
    let Some(scratch) = scratch().await else { return };
    let pool = &scratch.pool;

    assert_eq!(db::page_to_fetch(pool, &[]).await.unwrap(), Some(1));
    assert_eq!(db::page_to_fetch(pool, &[1]).await.unwrap(), None);
    assert_eq!(db::track_pages(pool, 3).await.unwrap(), 3);
    assert_eq!(db::track_pages(pool, 3).await.unwrap(), 0);
    assert_eq!(db::track_pages(pool, 5).await.unwrap(), 2);
    assert_eq!(db::tracked_page_count(pool).await.unwrap(), 5);

    let far = Utc::now() + Duration::weeks(10);
    for page in 1..=5 {
        db::schedule_page(pool, page, far).await.unwrap();
    }
    assert_eq!(db::page_to_fetch(pool, &[]).await.unwrap(), None);

    // due within the next day counts as due
    db::schedule_page(pool, 4, Utc::now() + Duration::hours(12)).await.unwrap();
    db::schedule_page(pool, 2, Utc::now() - Duration::hours(3)).await.unwrap();
    assert_eq!(db::page_to_fetch(pool, &[]).await.unwrap(), Some(2));

    // pages already handled in this cycle are skipped
    assert_eq!(db::page_to_fetch(pool, &[2]).await.unwrap(), Some(4));
    assert_eq!(db::page_to_fetch(pool, &[2, 4]).await.unwrap(), None);

    db::schedule_page(pool, 2, far).await.unwrap();
    assert_eq!(db::page_to_fetch(pool, &[]).await.unwrap(), Some(4));

    let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
    db::schedule_page(pool, 5, at).await.unwrap();
    let pages = db::tracked_pages(pool).await.unwrap();
    assert_eq!(pages.len(), 5);
    assert_eq!(pages[4].page, 5);
    assert_eq!(pages[4].next_scheduled_update, at);

    scratch.drop_schema().await;
}

struct FailingSource;

#[async_trait]
impl AnimeSource for FailingSource {
    async fn fetch_page(&self, _page: i32) -> Result<MediaPage, FetchError> {
        Err(FetchError::MissingData)
    }
}

struct OnePageSource(Vec<AnimeRecord>);

#[async_trait]
impl AnimeSource for OnePageSource {
    async fn fetch_page(&self, page: i32) -> Result<MediaPage, FetchError> {
        Ok(MediaPage {
            page,
            last_page: 2,
            has_next_page: page < 2,
            records: self.0.clone(),
        })
    }
}

#[tokio::test]
async fn failed_cycle_leaves_database_untouched() -> Result<()> {
    let Some(scratch) = scratch().await else { return Ok(()) };
    let store = PgStore::new(scratch.pool.clone());

    let report = updater::run_cycle(&OnePageSource(vec![anime(7, "Planetes")]), &store, 1).await?;
    assert_eq!(report.pages, 1);
    assert_eq!(db::tracked_page_count(store.pool()).await?, 2);
    let before = db::find_anime(store.pool(), 7).await?;

    // page 2 is still due, so the failing source gets asked for it
    assert_eq!(store.page_to_fetch(&[]).await?, Some(2));
    assert!(updater::run_cycle(&FailingSource, &store, 1).await.is_err());

    assert_eq!(db::find_anime(store.pool(), 7).await?, before);
    assert_eq!(db::tracked_page_count(store.pool()).await?, 2);

    scratch.drop_schema().await;
    Ok(())
}
