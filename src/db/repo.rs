//! SQL repository functions.
//!
//! Every function takes the pool (or a connection for the per-record helpers)
//! and maps rows into `db::model` types. Anime rows are keyed by `anilist_id`;
//! the internal `id` is allocated on first insert and never changes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection, Row};
use tracing::{info, instrument, warn};

use super::model::{StoredAnime, TrackedPage};
use super::Pool;
use crate::model::{AnimeRecord, UpsertReport};

/// Write `records` in one transaction, each inside its own savepoint so a
/// failing record is rolled back alone.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn upsert_batch(pool: &Pool, records: &[AnimeRecord]) -> Result<UpsertReport> {
    let mut report = UpsertReport::default();
    if records.is_empty() {
        return Ok(report);
    }

    let mut tx = pool.begin().await?;
    for record in records {
        let mut savepoint = Connection::begin(&mut *tx).await?;
        match upsert_anime(&mut savepoint, record).await {
            Ok(()) => {
                savepoint.commit().await?;
                report.upserted += 1;
            }
            Err(err) => {
                savepoint.rollback().await?;
                warn!(?err, anilist_id = record.anilist_id, "failed to upsert anime");
                report.failed += 1;
            }
        }
    }
    tx.commit().await?;

    info!(
        upserted = report.upserted,
        failed = report.failed,
        "inserted/updated animes"
    );
    Ok(report)
}

/// Upsert one anime and replace its genre associations.
async fn upsert_anime(conn: &mut PgConnection, record: &AnimeRecord) -> Result<()> {
    let anime_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO animes (
            id,
            anilist_id,
            title,
            anilist_cover,
            format_id,
            release_year,
            status_id,
            anilist_normalized_score,
            mal_id,
            created_at,
            updated_at
        )
        VALUES (
            (SELECT COALESCE(MAX(id), 0) + 1 FROM animes),
            $1,
            $2,
            $3,
            (SELECT id FROM anime_formats WHERE anilist = $4),
            $5,
            (SELECT id FROM anime_air_statuses WHERE anilist = $6),
            $7,
            $8,
            NOW(),
            NOW()
        )
        ON CONFLICT (anilist_id) DO UPDATE SET
            title = EXCLUDED.title,
            anilist_cover = EXCLUDED.anilist_cover,
            format_id = EXCLUDED.format_id,
            release_year = EXCLUDED.release_year,
            status_id = EXCLUDED.status_id,
            anilist_normalized_score = EXCLUDED.anilist_normalized_score,
            mal_id = EXCLUDED.mal_id,
            updated_at = EXCLUDED.updated_at
        RETURNING id
        "#,
    )
    .bind(record.anilist_id)
    .bind(&record.title)
    .bind(record.cover_url.as_deref())
    .bind(record.format.map(|f| f.as_str()))
    .bind(record.release_year)
    .bind(record.status.map(|s| s.as_str()))
    .bind(record.normalized_score)
    .bind(record.mal_id)
    .fetch_one(&mut *conn)
    .await
    .context("upsert into animes")?;

    sqlx::query("INSERT INTO genres (name) SELECT UNNEST($1::text[]) ON CONFLICT (name) DO NOTHING")
        .bind(record.genres.as_slice())
        .execute(&mut *conn)
        .await
        .context("insert genres")?;

    sqlx::query("DELETE FROM anime_genres WHERE anime_id = $1")
        .bind(anime_id)
        .execute(&mut *conn)
        .await
        .context("clear genre associations")?;

    sqlx::query(
        r#"
        INSERT INTO anime_genres (anime_id, genre_id)
        SELECT $1::bigint, id FROM genres WHERE name = ANY($2::text[])
        ON CONFLICT (anime_id, genre_id) DO NOTHING
        "#,
    )
    .bind(anime_id)
    .bind(record.genres.as_slice())
    .execute(&mut *conn)
    .await
    .context("insert genre associations")?;

    Ok(())
}

#[instrument(skip_all)]
pub async fn tracked_page_count(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(page) FROM anilist_update_tracking")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// The page due within the next day, most overdue first, skipping the pages in
/// `exclude`. Page 1 when nothing has been tracked yet.
#[instrument(skip_all)]
pub async fn page_to_fetch(pool: &Pool, exclude: &[i32]) -> Result<Option<i32>> {
    let page = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT page
        FROM anilist_update_tracking
        WHERE next_scheduled_update < NOW() + INTERVAL '1 day'
          AND page <> ALL($1::int[])
        ORDER BY next_scheduled_update ASC, page ASC
        LIMIT 1
        "#,
    )
    .bind(exclude)
    .fetch_optional(pool)
    .await?;

    if page.is_none() && !exclude.contains(&1) && tracked_page_count(pool).await? == 0 {
        return Ok(Some(1));
    }
    Ok(page)
}

/// Track every page after the highest known one, up to `last_page`.
#[instrument(skip_all)]
pub async fn track_pages(pool: &Pool, last_page: i32) -> Result<u64> {
    let added = sqlx::query(
        r#"
        INSERT INTO anilist_update_tracking (page)
        SELECT g
        FROM generate_series(
            (SELECT COALESCE(MAX(page), 0) + 1 FROM anilist_update_tracking),
            $1::int
        ) AS g
        ON CONFLICT (page) DO NOTHING
        "#,
    )
    .bind(last_page)
    .execute(pool)
    .await?
    .rows_affected();

    if added == 0 {
        info!("no new pages detected");
    } else {
        info!(added, last_page, "tracking new AniList pages");
    }
    Ok(added)
}

#[instrument(skip_all)]
pub async fn schedule_page(pool: &Pool, page: i32, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO anilist_update_tracking (page, next_scheduled_update) VALUES ($1, $2)
        ON CONFLICT (page) DO UPDATE SET next_scheduled_update = EXCLUDED.next_scheduled_update
        "#,
    )
    .bind(page)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn tracked_pages(pool: &Pool) -> Result<Vec<TrackedPage>> {
    let rows = sqlx::query(
        "SELECT page, next_scheduled_update::timestamptz AS next_scheduled_update FROM anilist_update_tracking ORDER BY page",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| TrackedPage {
            page: row.get("page"),
            next_scheduled_update: row.get("next_scheduled_update"),
        })
        .collect())
}

#[instrument(skip_all)]
pub async fn find_anime(pool: &Pool, anilist_id: i64) -> Result<Option<StoredAnime>> {
    let row = sqlx::query(
        r#"
        SELECT a.id, a.anilist_id, a.mal_id, a.title, a.anilist_cover,
               f.anilist AS format, s.anilist AS status,
               a.release_year, a.anilist_normalized_score,
               a.created_at, a.updated_at
        FROM animes a
        LEFT JOIN anime_formats f ON f.id = a.format_id
        LEFT JOIN anime_air_statuses s ON s.id = a.status_id
        WHERE a.anilist_id = $1
        "#,
    )
    .bind(anilist_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| StoredAnime {
        id: row.get("id"),
        anilist_id: row.get("anilist_id"),
        mal_id: row.get("mal_id"),
        title: row.get("title"),
        cover_url: row.get("anilist_cover"),
        format: row.get("format"),
        status: row.get("status"),
        release_year: row.get("release_year"),
        normalized_score: row.get("anilist_normalized_score"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }))
}

/// Genre names currently associated with an anime, sorted.
#[instrument(skip_all)]
pub async fn anime_genres(pool: &Pool, anilist_id: i64) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT g.name
        FROM anime_genres ag
        JOIN animes a ON a.id = ag.anime_id
        JOIN genres g ON g.id = ag.genre_id
        WHERE a.anilist_id = $1
        ORDER BY g.name
        "#,
    )
    .bind(anilist_id)
    .fetch_all(pool)
    .await?;
    Ok(names)
}
