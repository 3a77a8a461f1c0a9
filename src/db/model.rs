//! Row models returned by repository queries.

use chrono::{DateTime, NaiveDateTime, Utc};

/// A page of the AniList catalogue tracked for periodic refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPage {
    pub page: i32,
    pub next_scheduled_update: DateTime<Utc>,
}

/// An `animes` row with its lookup columns resolved back to AniList names.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAnime {
    pub id: i64,
    pub anilist_id: i64,
    pub mal_id: Option<i64>,
    pub title: String,
    pub cover_url: Option<String>,
    pub format: Option<String>,
    pub status: Option<String>,
    pub release_year: Option<i32>,
    pub normalized_score: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
