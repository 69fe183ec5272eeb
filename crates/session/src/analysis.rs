//! Analysis backend contract and cancellation-aware request driver.

use interpreter::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::machine::AnalysisModule;

/// Tool call name an analysis agent emits when it wants the conversation
/// back on the general query path.
pub const SESSION_EXIT_TOOL: &str = "exit_session";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub module: AnalysisModule,
    pub lat: f64,
    pub lng: f64,
    /// Free-text question for modules that take one (vision, comparison).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Base64 PNG of the current map view, when capture succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub status: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl AnalysisResponse {
    pub fn signals_session_exit(&self) -> bool {
        self.tool_calls.iter().any(|call| call.name == SESSION_EXIT_TOOL)
    }
}

#[derive(Debug)]
pub struct AnalysisError {
    pub message: String,
}

impl AnalysisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "analysis request failed: {}", self.message)
    }
}

impl std::error::Error for AnalysisError {}

/// Analysis backend. Implementations must be `Send + Sync`.
pub trait AnalysisClient: Send + Sync {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BoxFuture<'a, Result<AnalysisResponse, AnalysisError>>;
}

/// Drives one analysis request under a cancellation token.
///
/// Cancellation is an expected outcome, not an error: the in-flight future
/// is dropped and `Ok(None)` comes back, so a repositioned pin never
/// surfaces a stale result or a spurious failure message. Even if the
/// backend resolves after the token fires, the result goes nowhere.
pub async fn run_analysis(
    client: &dyn AnalysisClient,
    request: &AnalysisRequest,
    token: &CancellationToken,
) -> Result<Option<AnalysisResponse>, AnalysisError> {
    tokio::select! {
        _ = token.cancelled() => {
            debug!("analysis request cancelled before completion");
            Ok(None)
        }
        result = client.analyze(request) => result.map(Some),
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use interpreter::BoxFuture;
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use super::{
        AnalysisClient, AnalysisError, AnalysisRequest, AnalysisResponse, run_analysis,
    };
    use crate::machine::AnalysisModule;

    struct NeverResolves;

    impl AnalysisClient for NeverResolves {
        fn analyze<'a>(
            &'a self,
            _request: &'a AnalysisRequest,
        ) -> BoxFuture<'a, Result<AnalysisResponse, AnalysisError>> {
            Box::pin(pending())
        }
    }

    struct Scripted(String);

    impl AnalysisClient for Scripted {
        fn analyze<'a>(
            &'a self,
            _request: &'a AnalysisRequest,
        ) -> BoxFuture<'a, Result<AnalysisResponse, AnalysisError>> {
            Box::pin(async move {
                Ok(AnalysisResponse {
                    status: "completed".to_string(),
                    session_id: Some(self.0.clone()),
                    response: "slope is gentle".to_string(),
                    tool_calls: vec![],
                })
            })
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            module: AnalysisModule::Terrain,
            lat: 46.2,
            lng: 7.5,
            query: None,
            screenshot: None,
        }
    }

    #[tokio::test]
    async fn cancelled_request_yields_no_result_and_no_error() {
        let token = CancellationToken::new();
        token.cancel();
        let out = run_analysis(&NeverResolves, &request(), &token).await;
        assert!(matches!(out, Ok(None)));
    }

    #[tokio::test]
    async fn uncancelled_request_passes_the_response_through() {
        let token = CancellationToken::new();
        let out = run_analysis(&Scripted("sess-1".to_string()), &request(), &token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn session_exit_is_detected_by_tool_call_name() {
        let reply: AnalysisResponse = serde_json::from_str(
            r#"{
                "status": "completed",
                "response": "handing back",
                "toolCalls": [{"name": "exit_session", "arguments": {}}]
            }"#,
        )
        .unwrap();
        assert!(reply.signals_session_exit());
    }
}
