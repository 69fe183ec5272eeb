//! Geospatial search collaborator contract.

use std::time::Duration;

use imagery::{ItemRecord, MAX_RENDER_ITEMS};
use interpreter::BoxFuture;

/// Hard ceiling on one expansion search round trip.
pub const EXPANSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub collections: Vec<String>,
    pub bbox: [f64; 4],
    pub limit: usize,
    /// Catalog sort expression; newest first by default.
    pub sort: Option<String>,
}

impl SearchQuery {
    pub fn bounded(collection: impl Into<String>, bbox: [f64; 4]) -> Self {
        Self {
            collections: vec![collection.into()],
            bbox,
            limit: MAX_RENDER_ITEMS,
            sort: Some("-datetime".to_string()),
        }
    }
}

#[derive(Debug)]
pub struct SearchError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SearchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Issues bounded item searches. Implementations must be `Send + Sync`;
/// methods return boxed futures for dyn-compatibility.
pub trait SearchClient: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
    ) -> BoxFuture<'a, Result<Vec<ItemRecord>, SearchError>>;
}

#[derive(Debug)]
pub enum ExpansionError {
    /// The search exceeded [`EXPANSION_TIMEOUT`]. Non-fatal: current tiles
    /// stay up.
    Timeout,
    Search(SearchError),
}

impl std::fmt::Display for ExpansionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpansionError::Timeout => write!(f, "expansion search timed out"),
            ExpansionError::Search(err) => write!(f, "expansion search failed: {err}"),
        }
    }
}

impl std::error::Error for ExpansionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExpansionError::Timeout => None,
            ExpansionError::Search(err) => Some(err),
        }
    }
}

/// Runs one expansion search under the 10 s ceiling.
pub async fn run_expansion_search(
    client: &dyn SearchClient,
    query: &SearchQuery,
) -> Result<Vec<ItemRecord>, ExpansionError> {
    match tokio::time::timeout(EXPANSION_TIMEOUT, client.search(query)).await {
        Err(_) => Err(ExpansionError::Timeout),
        Ok(Err(err)) => Err(ExpansionError::Search(err)),
        Ok(Ok(items)) => Ok(items),
    }
}

#[cfg(test)]
mod tests {
    use interpreter::BoxFuture;

    use super::{
        ExpansionError, SearchClient, SearchError, SearchQuery, run_expansion_search,
    };

    struct NeverResolves;

    impl SearchClient for NeverResolves {
        fn search<'a>(
            &'a self,
            _query: &'a SearchQuery,
        ) -> BoxFuture<'a, Result<Vec<imagery::ItemRecord>, SearchError>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn search_that_never_answers_times_out() {
        let query = SearchQuery::bounded("sentinel-2-l2a", [0.0, 0.0, 1.0, 1.0]);
        let err = run_expansion_search(&NeverResolves, &query).await.unwrap_err();
        assert!(matches!(err, ExpansionError::Timeout));
    }

    #[test]
    fn bounded_query_defaults() {
        let q = SearchQuery::bounded("sentinel-2-l2a", [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(q.limit, 50);
        assert_eq!(q.sort.as_deref(), Some("-datetime"));
    }
}
