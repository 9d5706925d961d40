//! Backend HTTP client — ranked search and article fetch.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wikivoice_core::types::{ApiFlavor, Article, SearchKind, SearchResult, Section};

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub flavor: ApiFlavor,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:35248".into(),
            timeout_ms: 10_000,
            flavor: ApiFlavor::Current,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned HTTP {0}")]
    Http(reqwest::StatusCode),
    #[error("backend reported status '{status}': {message}")]
    Backend { status: String, message: String },
    #[error("response carried no article")]
    MissingArticle,
}

/// Search and article lookups as seen by the session.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Ranked results for one search kind. Failures yield an empty list.
    async fn search(&self, kind: SearchKind, query: &str, limit: u32) -> Vec<SearchResult>;

    async fn article(&self, id: u64) -> Result<Article, ApiError>;
}

/// Query every kind concurrently and concatenate the results in kind order.
pub async fn search_all(
    backend: &dyn Backend,
    kinds: &[SearchKind],
    query: &str,
    limit: u32,
) -> Vec<SearchResult> {
    let lookups = kinds.iter().map(|&kind| backend.search(kind, query, limit));
    join_all(lookups).await.into_iter().flatten().collect()
}

// ─── Wire format ───────────────────────────────────────────────────────────

const STATUS_SUCCESS: &str = "success";

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    results: Option<Vec<WireResult>>,
}

#[derive(Deserialize)]
struct WireResult {
    article_id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ArticleResponse {
    status: String,
    #[serde(default)]
    message: String,
    article: Option<WireArticle>,
}

#[derive(Deserialize)]
struct WireArticle {
    title: String,
    #[serde(default)]
    sections: Vec<WireSection>,
}

#[derive(Deserialize)]
struct WireSection {
    #[serde(default)]
    title: String,
    #[serde(default)]
    texts: Option<Vec<String>>,
    /// Older servers send one string per section.
    #[serde(default)]
    content: Option<String>,
}

impl From<WireResult> for SearchResult {
    fn from(r: WireResult) -> Self {
        SearchResult {
            id: r.article_id,
            title: r.title,
            snippet: r.text,
        }
    }
}

impl From<WireSection> for Section {
    fn from(s: WireSection) -> Self {
        match (s.texts, s.content) {
            (Some(texts), _) => Section::new(s.title, texts),
            (None, Some(content)) if !content.trim().is_empty() => {
                Section::from_content(s.title, content)
            }
            (None, _) => Section::new(s.title, Vec::new()),
        }
    }
}

impl From<WireArticle> for Article {
    fn from(a: WireArticle) -> Self {
        Article::new(a.title, a.sections.into_iter().map(Section::from).collect())
    }
}

// ─── Client ────────────────────────────────────────────────────────────────

/// reqwest-backed [`Backend`].
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Search with errors surfaced. [`Backend::search`] maps them to empty.
    pub async fn try_search(
        &self,
        kind: SearchKind,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let url = self.url(&format!("/api/search/{}", kind.path(self.config.flavor)));
        let resp = self
            .client
            .post(&url)
            .json(&SearchRequest { query, limit })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Http(resp.status()));
        }
        let body: SearchResponse = resp.json().await?;
        if body.status != STATUS_SUCCESS {
            return Err(ApiError::Backend {
                status: body.status,
                message: body.message,
            });
        }
        Ok(body
            .results
            .unwrap_or_default()
            .into_iter()
            .map(SearchResult::from)
            .collect())
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn search(&self, kind: SearchKind, query: &str, limit: u32) -> Vec<SearchResult> {
        match self.try_search(kind, query, limit).await {
            Ok(results) => {
                debug!(?kind, count = results.len(), "search finished");
                results
            }
            Err(e) => {
                warn!(?kind, "search failed: {e}");
                Vec::new()
            }
        }
    }

    async fn article(&self, id: u64) -> Result<Article, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/article"))
            .query(&[("id", id)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Http(resp.status()));
        }
        let body: ArticleResponse = resp.json().await?;
        if body.status != STATUS_SUCCESS {
            return Err(ApiError::Backend {
                status: body.status,
                message: body.message,
            });
        }
        let article = Article::from(body.article.ok_or(ApiError::MissingArticle)?);
        debug!(id, title = %article.title, sections = article.sections.len(), "article fetched");
        Ok(article)
    }
}
