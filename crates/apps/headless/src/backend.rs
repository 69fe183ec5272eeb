//! HTTP-backed collaborator implementations.
//!
//! One reqwest client is shared across all of them; each backend trait is
//! implemented as a thin wrapper that speaks the remote endpoint's JSON
//! shape and maps transport failures into the collaborator's error type.

use expansion::{SearchClient, SearchError, SearchQuery};
use imagery::ItemRecord;
use interpreter::{
    BoxFuture, ChatResponse, RawStacItem, TileIndexDoc, TileIndexError, TileIndexFetcher,
};
use render::{SignError, UrlSigner};
use serde_json::json;
use session::{AnalysisClient, AnalysisError, AnalysisRequest, AnalysisResponse};
use tracing::debug;

#[derive(Debug)]
pub struct BackendError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    fn transport(context: &str, err: reqwest::Error) -> Self {
        Self {
            message: format!("{context}: {err}"),
            source: Some(Box::new(err)),
        }
    }

    fn status(context: &str, status: reqwest::StatusCode) -> Self {
        Self {
            message: format!("{context}: backend answered {status}"),
            source: None,
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Conversational query endpoint.
pub struct HttpChatBackend {
    http: reqwest::Client,
    url: String,
}

impl HttpChatBackend {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    pub async fn ask(&self, query: &str) -> Result<ChatResponse, BackendError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| BackendError::transport("chat query failed", e))?;
        if !resp.status().is_success() {
            return Err(BackendError::status("chat query failed", resp.status()));
        }
        resp.json()
            .await
            .map_err(|e| BackendError::transport("chat response parse failed", e))
    }
}

pub struct HttpTileIndexFetcher {
    http: reqwest::Client,
}

impl HttpTileIndexFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl TileIndexFetcher for HttpTileIndexFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<TileIndexDoc, TileIndexError>> {
        Box::pin(async move {
            let resp = self.http.get(url).send().await.map_err(|e| TileIndexError {
                message: format!("tile index fetch failed: {e}"),
                source: Some(Box::new(e)),
            })?;
            if !resp.status().is_success() {
                return Err(TileIndexError::new(format!(
                    "tile index at {url} answered {}",
                    resp.status()
                )));
            }
            resp.json().await.map_err(|e| TileIndexError {
                message: format!("tile index parse failed: {e}"),
                source: Some(Box::new(e)),
            })
        })
    }
}

/// STAC item-search endpoint used for coverage expansion.
pub struct HttpSearchClient {
    http: reqwest::Client,
    url: String,
}

impl HttpSearchClient {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

impl SearchClient for HttpSearchClient {
    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
    ) -> BoxFuture<'a, Result<Vec<ItemRecord>, SearchError>> {
        Box::pin(async move {
            let mut body = json!({
                "collections": query.collections,
                "bbox": query.bbox,
                "limit": query.limit,
            });
            if query.sort.as_deref() == Some("-datetime") {
                body["sortby"] =
                    json!([{ "field": "properties.datetime", "direction": "desc" }]);
            }

            let resp = self
                .http
                .post(&self.url)
                .json(&body)
                .send()
                .await
                .map_err(|e| SearchError {
                    message: format!("item search failed: {e}"),
                    source: Some(Box::new(e)),
                })?;
            if !resp.status().is_success() {
                return Err(SearchError::new(format!(
                    "item search answered {}",
                    resp.status()
                )));
            }

            let page: serde_json::Value = resp.json().await.map_err(|e| SearchError {
                message: format!("search response parse failed: {e}"),
                source: Some(Box::new(e)),
            })?;
            let fallback = query.collections.first().cloned().unwrap_or_default();
            let features = page
                .get("features")
                .and_then(|f| f.as_array())
                .cloned()
                .unwrap_or_default();
            let mut items = Vec::with_capacity(features.len());
            for feature in features {
                match serde_json::from_value::<RawStacItem>(feature) {
                    Ok(raw) => items.push(raw.to_record(&fallback)),
                    Err(err) => debug!("skipping unparseable search feature: {err}"),
                }
            }
            Ok(items)
        })
    }
}

/// Tile URL signing endpoint. Best-effort by contract; the caller falls
/// back to the unsigned URL.
pub struct HttpUrlSigner {
    http: reqwest::Client,
    url: String,
}

impl HttpUrlSigner {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

impl UrlSigner for HttpUrlSigner {
    fn sign<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, SignError>> {
        Box::pin(async move {
            let resp = self
                .http
                .get(&self.url)
                .query(&[("href", url)])
                .send()
                .await
                .map_err(|e| SignError {
                    message: format!("sign request failed: {e}"),
                })?;
            if !resp.status().is_success() {
                return Err(SignError {
                    message: format!("sign endpoint answered {}", resp.status()),
                });
            }
            let doc: serde_json::Value = resp.json().await.map_err(|e| SignError {
                message: format!("sign response parse failed: {e}"),
            })?;
            doc.get("href")
                .and_then(|h| h.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| SignError {
                    message: "sign response carried no href".to_string(),
                })
        })
    }
}

/// Pin-analysis endpoint, plus the session-scoped message path.
pub struct HttpAnalysisClient {
    http: reqwest::Client,
    url: String,
}

impl HttpAnalysisClient {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    /// Sends a follow-up turn to an open analysis session.
    pub async fn continue_session(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<AnalysisResponse, AnalysisError> {
        let url = format!("{}/sessions/{session_id}/messages", self.url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "message": message }))
            .send()
            .await
            .map_err(|e| AnalysisError::new(format!("session message failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AnalysisError::new(format!(
                "session endpoint answered {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AnalysisError::new(format!("session response parse failed: {e}")))
    }
}

impl AnalysisClient for HttpAnalysisClient {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BoxFuture<'a, Result<AnalysisResponse, AnalysisError>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(&self.url)
                .json(request)
                .send()
                .await
                .map_err(|e| AnalysisError::new(format!("analysis request failed: {e}")))?;
            if !resp.status().is_success() {
                return Err(AnalysisError::new(format!(
                    "analysis endpoint answered {}",
                    resp.status()
                )));
            }
            resp.json()
                .await
                .map_err(|e| AnalysisError::new(format!("analysis response parse failed: {e}")))
        })
    }
}
