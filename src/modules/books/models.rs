use serde::{Deserialize, Serialize};

use crate::utils::split_list;

/// Fiction / non-fiction classification of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "Fiction")]
    Fiction,
    #[serde(rename = "Non-Fiction")]
    NonFiction,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Fiction => "Fiction",
            Classification::NonFiction => "Non-Fiction",
        }
    }

    /// Accepts spelling variants such as `fiction`, `Non Fiction` or
    /// `nonfiction`; anything else is unclassified.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "fiction" => Some(Classification::Fiction),
            "nonfiction" => Some(Classification::NonFiction),
            _ => None,
        }
    }
}

/// A persisted wishlist entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    /// Comma-separated when there are several authors.
    pub author: String,
    pub description: Option<String>,
    /// Up to two comma-separated region names.
    pub region: Option<String>,
    pub subjects: Vec<String>,
    pub is_fiction: Option<Classification>,
    pub is_owned: bool,
}

/// Row shape of the `books` table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BookRow {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub region: Option<String>,
    pub subjects: Option<String>,
    pub is_fiction: Option<String>,
    pub is_owned: bool,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: row.id,
            title: row.title,
            author: row.author,
            description: row.description,
            region: row.region,
            subjects: row.subjects.as_deref().map(split_list).unwrap_or_default(),
            is_fiction: row.is_fiction.as_deref().and_then(Classification::parse_lenient),
            is_owned: row.is_owned,
        }
    }
}

/// Fields for a new wishlist entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub region: Option<String>,
    pub subjects: Vec<String>,
    pub is_fiction: Option<Classification>,
    pub is_owned: bool,
}

/// Lightweight `{title, author}` pair listed inside stats buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookSummary {
    pub title: String,
    pub author: String,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        BookSummary {
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }
}

/// A normalized catalog search result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub authors: Vec<String>,
    pub key: String,
    pub subjects: Vec<String>,
}

/// One page of catalog results plus the provider's total match count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub total: u64,
}

impl SearchPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Metadata produced by the enrichment provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookDetails {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub region: Option<String>,
    pub subjects: Vec<String>,
    pub is_fiction: Option<Classification>,
}

// HTTP request and response bodies

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
}

/// Search result as returned to the frontend: authors pre-joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub authors: String,
    pub key: String,
    pub subjects: Vec<String>,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        SearchResult {
            title: hit.title,
            authors: hit.authors.join(", "),
            key: hit.key,
            subjects: hit.subjects,
        }
    }
}

/// A search result the user picked to add.
#[derive(Debug, Clone, Deserialize)]
pub struct BookSelection {
    #[serde(default)]
    pub book_key: String,
    pub title: String,
    #[serde(default)]
    pub authors_str: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub is_owned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl StatusMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OwnershipUpdate {
    #[serde(default)]
    pub is_owned: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// A wishlist entry as listed to the frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WishlistItem {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub region: Option<String>,
    pub subjects: Vec<String>,
    /// `Fiction`, `Non-Fiction` or `Unknown`.
    pub is_fiction: String,
    pub is_owned: bool,
}

impl From<Book> for WishlistItem {
    fn from(book: Book) -> Self {
        WishlistItem {
            id: book.id,
            title: book.title,
            author: book.author,
            description: book.description,
            region: book.region,
            subjects: book.subjects,
            is_fiction: book
                .is_fiction
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            is_owned: book.is_owned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WishlistPage {
    pub items: Vec<WishlistItem>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
    pub total_pages: i64,
}
