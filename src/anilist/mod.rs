//! AniList GraphQL client: fetches the anime catalogue one page at a time.
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::model::{AnimeRecord, MediaFormat};

use self::model::{GraphqlRequest, GraphqlResponse, MediaDto, PageData, PageVariables};

pub mod model;

/// AniList caps `perPage` at 50.
pub const PER_PAGE: i32 = 50;

pub const PAGE_QUERY: &str = r#"
query ($page: Int, $perPage: Int, $formats: [MediaFormat]) {
  Page(page: $page, perPage: $perPage) {
    pageInfo {
      lastPage
      hasNextPage
    }
    media(type: ANIME, format_in: $formats, sort: ID) {
      id
      idMal
      format
      status
      title {
        romaji
      }
      seasonYear
      coverImage {
        large
      }
      genres
      averageScore
    }
  }
}
"#;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to reach AniList: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate limited by AniList (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("AniList returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("AniList GraphQL error: {0}")]
    Graphql(String),
    #[error("invalid AniList response JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("AniList response carried no data")]
    MissingData,
}

/// One page of the catalogue, already mapped into records.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPage {
    pub page: i32,
    pub last_page: i32,
    pub has_next_page: bool,
    pub records: Vec<AnimeRecord>,
}

impl MediaPage {
    /// Newest season year among the page's records.
    pub fn latest_release_year(&self) -> Option<i32> {
        self.records.iter().filter_map(|r| r.release_year).max()
    }

    /// Last page worth tracking. `lastPage` can lag behind the catalogue, so a
    /// page reporting more results extends it by at least one.
    pub fn known_last_page(&self) -> i32 {
        if self.has_next_page {
            self.last_page.max(self.page + 1)
        } else {
            self.last_page
        }
    }
}

#[async_trait]
pub trait AnimeSource: Send + Sync {
    async fn fetch_page(&self, page: i32) -> Result<MediaPage, FetchError>;
}

#[derive(Clone)]
pub struct AnilistClient {
    http: Client,
    endpoint: Url,
}

impl fmt::Debug for AnilistClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnilistClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl AnilistClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(concat!("maki-updater/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { http, endpoint })
    }

    pub fn from_config(cfg: &RunConfig) -> Result<Self, FetchError> {
        Self::new(cfg.anilist_url.clone(), cfg.http_timeout)
    }

    pub fn build_request(&self, page: i32) -> Result<reqwest::Request, FetchError> {
        let body = GraphqlRequest {
            query: PAGE_QUERY,
            variables: PageVariables {
                page,
                per_page: PER_PAGE,
                formats: MediaFormat::ALL.iter().map(MediaFormat::as_str).collect(),
            },
        };
        let request = self
            .http
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .build()?;
        Ok(request)
    }

    pub async fn fetch_page(&self, page: i32) -> Result<MediaPage, FetchError> {
        let request = self.build_request(page)?;
        debug!(url = %request.url(), page, "requesting AniList page");

        let res = self.http.execute(request).await?;
        let status = res.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = res
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            warn!(page, ?retry_after, "rate limited by AniList");
            return Err(FetchError::RateLimited { retry_after });
        }

        let body = res.text().await?;
        if !status.is_success() {
            warn!(page, %status, "AniList API error");
            return Err(FetchError::Status { status, body });
        }

        let payload: GraphqlResponse<PageData> = serde_json::from_str(&body)?;
        if let Some(errors) = payload.errors.filter(|e| !e.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::Graphql(message));
        }
        let data = payload.data.ok_or(FetchError::MissingData)?.page;

        let received = data.media.len();
        let records: Vec<AnimeRecord> = data
            .media
            .into_iter()
            .filter_map(MediaDto::into_record)
            .collect();
        if records.len() < received {
            warn!(
                page,
                dropped = received - records.len(),
                "skipped media without a title"
            );
        }

        let last_page = data.page_info.last_page.unwrap_or(page).max(page);
        info!(page, last_page, records = records.len(), "fetched AniList page");
        Ok(MediaPage {
            page,
            last_page,
            has_next_page: data.page_info.has_next_page.unwrap_or(false),
            records,
        })
    }
}

#[async_trait]
impl AnimeSource for AnilistClient {
    async fn fetch_page(&self, page: i32) -> Result<MediaPage, FetchError> {
        AnilistClient::fetch_page(self, page).await
    }
}
