//! Bibliographic search against an external catalog (Google Books or Open Library).
//!
//! Provider responses are parsed into typed shapes and normalized to
//! [`SearchHit`]s. Missing or null fields become empty strings/lists. Any
//! transport or decoding failure is logged and yields an empty page.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::REFERER;
use serde::Deserialize;
use thiserror::Error;

use bookwish_kernel::settings::{CatalogProvider, CatalogSettings, Secret};

use super::models::{SearchHit, SearchPage};

const USER_AGENT: &str = concat!("bookwish/", env!("CARGO_PKG_VERSION"));
const GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com";
const GOOGLE_BOOKS_MAX_RESULTS: u32 = 40;
const OPEN_LIBRARY_BASE_URL: &str = "https://openlibrary.org";

#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// `page` is 1-indexed. Never fails: errors degrade to an empty page.
    async fn search(&self, query: &str, page: u32, page_size: u32) -> SearchPage;
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Zero-based offset of the first result on a 1-indexed page.
pub fn offset_for(page: u32, page_size: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(page_size)
}

/// Build the configured catalog client.
pub fn from_settings(settings: &CatalogSettings) -> Result<Arc<dyn CatalogSearch>, CatalogError> {
    let client: Arc<dyn CatalogSearch> = match settings.provider {
        CatalogProvider::GoogleBooks => Arc::new(GoogleBooksClient::new(settings)?),
        CatalogProvider::OpenLibrary => Arc::new(OpenLibraryClient::new(settings)?),
    };
    Ok(client)
}

fn http_client(settings: &CatalogSettings) -> Result<reqwest::Client, CatalogError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .user_agent(USER_AGENT)
        .build()?)
}

/// Shared driver: empty queries short-circuit, failures are logged.
async fn run_search<F>(provider: &'static str, query: &str, page: u32, fetch: F) -> SearchPage
where
    F: std::future::Future<Output = Result<SearchPage, CatalogError>>,
{
    if query.trim().is_empty() {
        return SearchPage::empty();
    }

    match fetch.await {
        Ok(found) => {
            tracing::info!(
                provider,
                query,
                page,
                returned = found.hits.len(),
                total = found.total,
                "catalog search complete"
            );
            found
        }
        Err(err) => {
            tracing::error!(provider, query, error = %err, "catalog search failed");
            SearchPage::empty()
        }
    }
}

pub struct GoogleBooksClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<Secret>,
    referer: String,
}

impl GoogleBooksClient {
    pub fn new(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        Ok(Self {
            http: http_client(settings)?,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| GOOGLE_BOOKS_BASE_URL.to_string()),
            api_key: settings.api_key.clone().filter(|key| !key.is_empty()),
            referer: settings.referer.clone(),
        })
    }

    async fn fetch(&self, query: &str, page: u32, page_size: u32) -> Result<SearchPage, CatalogError> {
        // Offsets must step by the size the provider actually returns
        let page_size = page_size.min(GOOGLE_BOOKS_MAX_RESULTS);
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("maxResults", page_size.to_string()),
            ("startIndex", offset_for(page, page_size).to_string()),
            ("printType", "books".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.expose().to_string()));
        }

        let response: VolumesResponse = self
            .http
            .get(format!("{}/books/v1/volumes", self.base_url.trim_end_matches('/')))
            .header(REFERER, &self.referer)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.into())
    }
}

#[async_trait]
impl CatalogSearch for GoogleBooksClient {
    async fn search(&self, query: &str, page: u32, page_size: u32) -> SearchPage {
        run_search("google_books", query, page, self.fetch(query, page, page_size)).await
    }
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(rename = "totalItems")]
    total_items: Option<u64>,
    items: Option<Vec<Volume>>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: Option<String>,
    #[serde(rename = "volumeInfo")]
    volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Deserialize)]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    categories: Option<Vec<String>>,
}

impl From<VolumesResponse> for SearchPage {
    fn from(response: VolumesResponse) -> Self {
        let hits = response
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|volume| {
                let info = volume.volume_info;
                let (title, authors, subjects) = match info {
                    Some(info) => (
                        info.title.unwrap_or_default(),
                        info.authors.unwrap_or_default(),
                        info.categories.unwrap_or_default(),
                    ),
                    None => Default::default(),
                };
                SearchHit {
                    title,
                    authors,
                    key: volume.id.unwrap_or_default(),
                    subjects,
                }
            })
            .collect();

        SearchPage {
            hits,
            total: response.total_items.unwrap_or(0),
        }
    }
}

pub struct OpenLibraryClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenLibraryClient {
    pub fn new(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        Ok(Self {
            http: http_client(settings)?,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| OPEN_LIBRARY_BASE_URL.to_string()),
        })
    }

    async fn fetch(&self, query: &str, page: u32, page_size: u32) -> Result<SearchPage, CatalogError> {
        let params: [(&str, String); 4] = [
            ("q", format!("{query} language:eng")),
            ("offset", offset_for(page, page_size).to_string()),
            ("limit", page_size.to_string()),
            ("fields", "key,title,author_name,subject".to_string()),
        ];

        let response: OpenLibraryResponse = self
            .http
            .get(format!("{}/search.json", self.base_url.trim_end_matches('/')))
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.into())
    }
}

#[async_trait]
impl CatalogSearch for OpenLibraryClient {
    async fn search(&self, query: &str, page: u32, page_size: u32) -> SearchPage {
        run_search("open_library", query, page, self.fetch(query, page, page_size)).await
    }
}

#[derive(Debug, Deserialize)]
struct OpenLibraryResponse {
    #[serde(rename = "numFound")]
    num_found: Option<u64>,
    docs: Option<Vec<OpenLibraryDoc>>,
}

#[derive(Debug, Deserialize)]
struct OpenLibraryDoc {
    key: Option<String>,
    title: Option<String>,
    author_name: Option<Vec<String>>,
    subject: Option<Vec<String>>,
}

impl From<OpenLibraryResponse> for SearchPage {
    fn from(response: OpenLibraryResponse) -> Self {
        let hits = response
            .docs
            .unwrap_or_default()
            .into_iter()
            .map(|doc| SearchHit {
                title: doc.title.unwrap_or_default(),
                authors: doc.author_name.unwrap_or_default(),
                key: doc.key.unwrap_or_default(),
                subjects: doc.subject.unwrap_or_default(),
            })
            .collect();

        SearchPage {
            hits,
            total: response.num_found.unwrap_or(0),
        }
    }
}
