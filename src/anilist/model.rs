use serde::{Deserialize, Serialize};

use crate::model::{AirStatus, AnimeRecord, MediaFormat};

#[derive(Serialize, Debug)]
pub struct GraphqlRequest<'a> {
    pub query: &'a str,
    pub variables: PageVariables,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PageVariables {
    pub page: i32,
    pub per_page: i32,
    pub formats: Vec<&'static str>,
}

#[derive(Deserialize, Debug)]
pub struct GraphqlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize, Debug)]
pub struct GraphqlError {
    pub message: String,
    pub status: Option<u16>,
}

#[derive(Deserialize, Debug)]
pub struct PageData {
    #[serde(rename = "Page")]
    pub page: PageDto,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PageDto {
    pub page_info: PageInfo,
    #[serde(default)]
    pub media: Vec<MediaDto>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub last_page: Option<i32>,
    pub has_next_page: Option<bool>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaDto {
    pub id: i64,
    pub id_mal: Option<i64>,
    pub format: Option<String>,
    pub status: Option<String>,
    pub title: Option<MediaTitle>,
    pub season_year: Option<i32>,
    pub cover_image: Option<CoverImage>,
    pub genres: Option<Vec<String>>,
    pub average_score: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct MediaTitle {
    pub romaji: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CoverImage {
    pub large: Option<String>,
}

impl MediaDto {
    /// Map to a normalized record. Media without a romaji title are dropped.
    pub fn into_record(self) -> Option<AnimeRecord> {
        let title = self
            .title
            .and_then(|t| t.romaji)
            .filter(|t| !t.trim().is_empty())?;
        let record = AnimeRecord {
            anilist_id: self.id,
            mal_id: self.id_mal,
            title,
            cover_url: self.cover_image.and_then(|c| c.large),
            format: self.format.as_deref().and_then(MediaFormat::from_anilist),
            status: self.status.as_deref().and_then(AirStatus::from_anilist),
            release_year: self.season_year,
            normalized_score: self.average_score.map(|s| s / 100.0),
            genres: self.genres.unwrap_or_default(),
        };
        Some(record.normalize())
    }
}
