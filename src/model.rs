use serde::{Deserialize, Serialize};

/// Oldest release year stored; earlier years are clamped to it.
pub const MIN_RELEASE_YEAR: i32 = 1940;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaFormat {
    Tv,
    TvShort,
    Movie,
    Special,
    Ova,
    Ona,
    Music,
}

impl MediaFormat {
    pub const ALL: [MediaFormat; 7] = [
        MediaFormat::Tv,
        MediaFormat::TvShort,
        MediaFormat::Movie,
        MediaFormat::Ova,
        MediaFormat::Ona,
        MediaFormat::Special,
        MediaFormat::Music,
    ];

    pub fn from_anilist(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Tv => "TV",
            MediaFormat::TvShort => "TV_SHORT",
            MediaFormat::Movie => "MOVIE",
            MediaFormat::Special => "SPECIAL",
            MediaFormat::Ova => "OVA",
            MediaFormat::Ona => "ONA",
            MediaFormat::Music => "MUSIC",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AirStatus {
    Finished,
    Releasing,
    NotYetReleased,
    Cancelled,
    Hiatus,
}

impl AirStatus {
    pub const ALL: [AirStatus; 5] = [
        AirStatus::Finished,
        AirStatus::Releasing,
        AirStatus::NotYetReleased,
        AirStatus::Cancelled,
        AirStatus::Hiatus,
    ];

    pub fn from_anilist(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AirStatus::Finished => "FINISHED",
            AirStatus::Releasing => "RELEASING",
            AirStatus::NotYetReleased => "NOT_YET_RELEASED",
            AirStatus::Cancelled => "CANCELLED",
            AirStatus::Hiatus => "HIATUS",
        }
    }
}

/// One anime row as written to the `animes` table, keyed by `anilist_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimeRecord {
    pub anilist_id: i64,
    pub mal_id: Option<i64>,
    pub title: String,
    pub cover_url: Option<String>,
    pub format: Option<MediaFormat>,
    pub status: Option<AirStatus>,
    pub release_year: Option<i32>,
    pub normalized_score: Option<f64>,
    pub genres: Vec<String>,
}

impl AnimeRecord {
    /// Clamp the year and score into their stored ranges and canonicalize genres.
    pub fn normalize(mut self) -> Self {
        self.release_year = self.release_year.map(|y| y.max(MIN_RELEASE_YEAR));
        self.normalized_score = self
            .normalized_score
            .filter(|s| !s.is_nan())
            .map(|s| s.clamp(0.0, 1.0));

        let mut genres: Vec<String> = Vec::with_capacity(self.genres.len());
        for genre in self.genres.iter().map(|g| normalize_genre(g)) {
            if !genre.is_empty() && !genres.contains(&genre) {
                genres.push(genre);
            }
        }
        self.genres = genres;
        self
    }
}

/// `"Slice of Life"` -> `"slice_of_life"`.
pub fn normalize_genre(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Outcome of writing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub upserted: usize,
    pub failed: usize,
}
