//! AI metadata enrichment through a chat-completions API.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bookwish_kernel::settings::{EnrichmentSettings, Secret};

use super::models::{BookDetails, Classification};
use crate::utils::{join_list, split_list};

const MAX_REGIONS: usize = 2;

static CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+(?:\s*,\s*\d+)*\]").expect("citation pattern is valid"));

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// `None` means enrichment is unavailable for this book.
    async fn get_details(&self, title: &str, author: &str) -> Option<BookDetails>;
}

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion contained no message")]
    EmptyCompletion,
}

pub struct PerplexityClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<Secret>,
}

impl PerplexityClient {
    pub fn new(settings: &EnrichmentSettings) -> Result<Self, EnrichmentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone().filter(|key| !key.is_empty()),
        })
    }

    async fn complete(&self, api_key: &Secret, prompt: String) -> Result<String, EnrichmentError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response: ChatResponse = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key.expose())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(EnrichmentError::EmptyCompletion)
    }
}

#[async_trait]
impl MetadataSource for PerplexityClient {
    async fn get_details(&self, title: &str, author: &str) -> Option<BookDetails> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!(title, "enrichment api key not configured");
            return None;
        };

        match self.complete(api_key, details_prompt(title, author)).await {
            Ok(text) => {
                let details = parse_model_response(&text);
                if details.is_none() {
                    tracing::warn!(title, "enrichment response held no usable JSON");
                }
                details
            }
            Err(err) => {
                tracing::error!(title, error = %err, "enrichment request failed");
                None
            }
        }
    }
}

fn details_prompt(title: &str, author: &str) -> String {
    format!(
        r#"Provide details for the book "{title}" by {author}.

Respond in English with ONLY a valid JSON object, no explanation, in this format:
{{
    "title": "Full book title",
    "authors": ["Author Name"],
    "description": "Summary of the book in at most 100 words",
    "region": "The one or two world regions where the book is set or that it is about, comma separated",
    "subjects": ["at most 3 subjects or genres"],
    "is_fiction": "Fiction or Non-Fiction"
}}"#
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// A field the model may send either as one comma-joined string or as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_list(self) -> Vec<String> {
        match self {
            StringOrList::One(joined) => split_list(&joined),
            StringOrList::Many(items) => items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDetails {
    title: Option<String>,
    authors: Option<StringOrList>,
    description: Option<String>,
    region: Option<StringOrList>,
    subjects: Option<StringOrList>,
    is_fiction: Option<String>,
}

/// Extract [`BookDetails`] from free-form model output.
///
/// Code fences are dropped and the text between the first `{` and the last
/// `}` is parsed. Missing braces, invalid JSON and an empty object all give
/// `None`.
pub fn parse_model_response(text: &str) -> Option<BookDetails> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(&cleaned[start..=end]).ok()?;
    if value.as_object().map_or(true, |fields| fields.is_empty()) {
        return None;
    }
    let raw: RawDetails = serde_json::from_value(value).ok()?;

    let region = raw
        .region
        .map(StringOrList::into_list)
        .map(|regions| join_list(&regions[..regions.len().min(MAX_REGIONS)]))
        .filter(|region| !region.is_empty());

    Some(BookDetails {
        title: raw.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        authors: raw.authors.map(StringOrList::into_list).unwrap_or_default(),
        description: raw
            .description
            .map(|d| strip_citations(&d))
            .filter(|d| !d.is_empty()),
        region,
        subjects: raw.subjects.map(StringOrList::into_list).unwrap_or_default(),
        is_fiction: raw.is_fiction.as_deref().and_then(Classification::parse_lenient),
    })
}

/// Remove bracketed citation markers such as `[1]` or `[2, 3]`.
pub fn strip_citations(text: &str) -> String {
    CITATION.replace_all(text, "").trim().to_string()
}
