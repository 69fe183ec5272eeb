//! Session-scoped chat routing.
//!
//! A completed terrain or vision analysis can open a backend conversation.
//! While one is open, every chat turn goes to its specialized endpoint
//! instead of the general query path. The agent hands the conversation
//! back with an `exit_session` tool call, and the message that triggered
//! the exit is replayed through the general path so the user never has to
//! repeat themselves.

use tracing::{debug, info};

use crate::analysis::AnalysisResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRoute {
    General,
    Session { session_id: String },
}

/// What to do with a session endpoint's reply.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplyAction {
    /// Show the reply to the user.
    Surface,
    /// Discard the reply and resend the original message via the general
    /// path.
    ReplayThroughGeneral,
}

#[derive(Debug, Default)]
pub struct SessionRouter {
    active: Option<String>,
}

impl SessionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn enter(&mut self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        info!(%session_id, "chat routed to analysis session");
        self.active = Some(session_id);
    }

    pub fn route(&self) -> ChatRoute {
        match &self.active {
            Some(id) => ChatRoute::Session {
                session_id: id.clone(),
            },
            None => ChatRoute::General,
        }
    }

    /// Inspects a session reply for the exit signal. On exit the router
    /// drops the session before returning, so the replay routes general.
    pub fn observe_reply(&mut self, reply: &AnalysisResponse) -> ReplyAction {
        if reply.signals_session_exit() {
            debug!("analysis agent exited the session");
            self.active = None;
            ReplyAction::ReplayThroughGeneral
        } else {
            ReplyAction::Surface
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{ChatRoute, ReplyAction, SessionRouter};
    use crate::analysis::{AnalysisResponse, ToolCall};

    fn reply(tool_calls: Vec<ToolCall>) -> AnalysisResponse {
        AnalysisResponse {
            status: "completed".to_string(),
            session_id: None,
            response: "ok".to_string(),
            tool_calls,
        }
    }

    #[test]
    fn routes_general_until_a_session_opens() {
        let mut router = SessionRouter::new();
        assert_eq!(router.route(), ChatRoute::General);
        router.enter("sess-3");
        assert_eq!(
            router.route(),
            ChatRoute::Session {
                session_id: "sess-3".to_string()
            }
        );
    }

    #[test]
    fn exit_tool_call_closes_the_session_and_requests_a_replay() {
        let mut router = SessionRouter::new();
        router.enter("sess-3");

        let normal = reply(vec![]);
        assert_eq!(router.observe_reply(&normal), ReplyAction::Surface);
        assert_eq!(router.active_session(), Some("sess-3"));

        let exiting = reply(vec![ToolCall {
            name: "exit_session".to_string(),
            arguments: serde_json::Value::Null,
        }]);
        assert_eq!(
            router.observe_reply(&exiting),
            ReplyAction::ReplayThroughGeneral
        );
        assert_eq!(router.route(), ChatRoute::General);
    }
}
