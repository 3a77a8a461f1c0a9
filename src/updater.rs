//! One update cycle: pick due pages, fetch them from AniList, persist, reschedule.
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::{info, instrument};

use crate::anilist::AnimeSource;
use crate::db::AnimeStore;

/// Years subtracted from the current year when a page carries no release year.
pub const UNKNOWN_YEAR_OFFSET: i32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pages: u32,
    pub upserted: usize,
    pub failed: usize,
}

/// Pages with recent anime come back soon; each year of age adds a week.
pub fn next_page_update(now: DateTime<Utc>, latest_year: Option<i32>) -> DateTime<Utc> {
    let current_year = now.year();
    let year = latest_year.unwrap_or(current_year - UNKNOWN_YEAR_OFFSET);
    now + Duration::weeks(i64::from((year - current_year).unsigned_abs()))
}

#[instrument(skip_all)]
pub async fn run_cycle(
    source: &dyn AnimeSource,
    store: &dyn AnimeStore,
    pages_per_cycle: u32,
) -> Result<CycleReport> {
    let mut report = CycleReport::default();
    let mut visited: Vec<i32> = Vec::new();

    while report.pages < pages_per_cycle {
        let Some(page) = store.page_to_fetch(&visited).await? else {
            if report.pages == 0 {
                info!("no data requires update; skipping this tick");
            }
            break;
        };
        visited.push(page);

        info!(page, "updating AniList page");
        let fetched = source
            .fetch_page(page)
            .await
            .with_context(|| format!("failed to fetch AniList page {page}"))?;

        let batch = store.upsert_batch(&fetched.records).await?;
        store.track_pages(fetched.known_last_page()).await?;

        let next = next_page_update(Utc::now(), fetched.latest_release_year());
        store.schedule_page(page, next).await?;
        info!(page, next_update = %next, "page rescheduled");

        report.pages += 1;
        report.upserted += batch.upserted;
        report.failed += batch.failed;
    }

    Ok(report)
}
