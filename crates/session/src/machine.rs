//! Pin-driven analysis session state machine.
//!
//! Every interaction is an explicit transition returning the side effect
//! the caller must perform, instead of widgets mutating shared state
//! directly. The machine owns the cancellation token for the in-flight
//! request; repositioning or switching modules cancels the old request
//! before the new one starts, and a stale completion is detected by
//! request id and ignored.

use foundation::LatLng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisModule {
    Terrain,
    Mobility,
    Vision,
    BuildingDamage,
    Comparison,
}

impl AnalysisModule {
    /// Comparison works on the whole visible scene and never takes a pin.
    pub fn uses_pin(self) -> bool {
        !matches!(self, AnalysisModule::Comparison)
    }

    /// Vision waits for a user question after the pin lands; the other
    /// pin modules start analyzing immediately.
    pub fn auto_starts_analysis(self) -> bool {
        !matches!(self, AnalysisModule::Vision | AnalysisModule::Comparison)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinPhase {
    ModuleSelected,
    PinPlaced,
    Analyzing,
    Complete,
    Error,
    Cancelled,
}

#[derive(Debug)]
pub struct PinSession {
    pub module: AnalysisModule,
    pub phase: PinPhase,
    pub position: Option<LatLng>,
    /// Backend conversation id from a completed analysis, if the module
    /// opened one.
    pub session_id: Option<String>,
    request_id: u64,
    cancel: Option<CancellationToken>,
}

impl PinSession {
    fn new(module: AnalysisModule) -> Self {
        Self {
            module,
            phase: PinPhase::ModuleSelected,
            position: None,
            session_id: None,
            request_id: 0,
            cancel: None,
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

/// What the caller must do after a transition.
#[derive(Debug)]
pub enum SessionEffect {
    None,
    /// Issue an analysis request for the pinned position, racing it
    /// against `token`. Report the outcome back through
    /// [`PinSessionStateMachine::finish`] with `request_id`.
    StartAnalysis {
        request_id: u64,
        module: AnalysisModule,
        position: LatLng,
        query: Option<String>,
        token: CancellationToken,
    },
    /// Send free text straight to the comparison endpoint; no pin exists.
    ComparisonQuery { query: String },
    /// Vision pin landed; prompt the user for a question about it.
    AwaitQuestion,
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    Completed { session_id: Option<String> },
    Failed,
    Cancelled,
}

#[derive(Debug, Default)]
pub struct PinSessionStateMachine {
    session: Option<PinSession>,
    next_request_id: u64,
}

impl PinSessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&PinSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> Option<PinPhase> {
        self.session.as_ref().map(|s| s.phase)
    }

    /// Selecting the already-active module toggles it off; selecting a
    /// different one discards the current session entirely. Either way any
    /// in-flight request is cancelled.
    pub fn select_module(&mut self, module: AnalysisModule) -> SessionEffect {
        if let Some(session) = self.session.as_mut() {
            session.cancel_in_flight();
            if session.module == module {
                debug!(?module, "module toggled off");
                self.session = None;
                return SessionEffect::None;
            }
        }
        info!(?module, "analysis module selected");
        self.session = Some(PinSession::new(module));
        SessionEffect::None
    }

    /// Map click with a module armed. Placing (or repositioning) the pin
    /// cancels whatever was in flight for the previous position.
    pub fn place_pin(&mut self, position: LatLng) -> SessionEffect {
        let next_id = self.next_request_id + 1;
        let Some(session) = self.session.as_mut() else {
            // Clicks with no module armed are ordinary map interaction.
            return SessionEffect::None;
        };
        if !session.module.uses_pin() {
            return SessionEffect::None;
        }

        session.cancel_in_flight();
        session.position = Some(position);
        session.session_id = None;

        if !session.module.auto_starts_analysis() {
            session.phase = PinPhase::PinPlaced;
            return SessionEffect::AwaitQuestion;
        }

        self.next_request_id = next_id;
        let token = CancellationToken::new();
        session.cancel = Some(token.clone());
        session.request_id = next_id;
        session.phase = PinPhase::Analyzing;
        SessionEffect::StartAnalysis {
            request_id: next_id,
            module: session.module,
            position,
            query: None,
            token,
        }
    }

    /// Free text from the chat box while a session is armed. Comparison
    /// consumes every message; vision consumes the first question after
    /// its pin lands. Anything else flows to the general chat path.
    pub fn submit_query(&mut self, query: &str) -> SessionEffect {
        let next_id = self.next_request_id + 1;
        let Some(session) = self.session.as_mut() else {
            return SessionEffect::None;
        };
        match session.module {
            AnalysisModule::Comparison => SessionEffect::ComparisonQuery {
                query: query.to_string(),
            },
            AnalysisModule::Vision => {
                let Some(position) = session.position else {
                    return SessionEffect::None;
                };
                // Only the first question after the pin lands starts an
                // analysis; once one completes, follow-ups belong to the
                // backend session the completion opened.
                if session.phase != PinPhase::PinPlaced {
                    return SessionEffect::None;
                }
                self.next_request_id = next_id;
                let token = CancellationToken::new();
                session.cancel = Some(token.clone());
                session.request_id = next_id;
                session.phase = PinPhase::Analyzing;
                SessionEffect::StartAnalysis {
                    request_id: next_id,
                    module: AnalysisModule::Vision,
                    position,
                    query: Some(query.to_string()),
                    token,
                }
            }
            _ => SessionEffect::None,
        }
    }

    /// Reports the outcome of a started request. Outcomes for superseded
    /// requests are dropped so a repositioned pin never shows the old
    /// pin's result.
    pub fn finish(&mut self, request_id: u64, outcome: AnalysisOutcome) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.request_id != request_id || session.phase != PinPhase::Analyzing {
            debug!(request_id, "dropping stale analysis outcome");
            return false;
        }
        session.cancel = None;
        match outcome {
            AnalysisOutcome::Completed { session_id } => {
                session.phase = PinPhase::Complete;
                session.session_id = session_id;
            }
            AnalysisOutcome::Failed => session.phase = PinPhase::Error,
            AnalysisOutcome::Cancelled => session.phase = PinPhase::Cancelled,
        }
        true
    }

    /// Tears the session down, cancelling anything in flight.
    pub fn clear(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.cancel_in_flight();
        }
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use foundation::LatLng;
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use super::{
        AnalysisModule, AnalysisOutcome, PinPhase, PinSessionStateMachine, SessionEffect,
    };
    use crate::router::{ChatRoute, SessionRouter};

    fn pos(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).unwrap()
    }

    fn start(effect: SessionEffect) -> (u64, CancellationToken) {
        match effect {
            SessionEffect::StartAnalysis {
                request_id, token, ..
            } => (request_id, token),
            other => panic!("expected StartAnalysis, got {other:?}"),
        }
    }

    #[test]
    fn terrain_pin_starts_analysis_immediately() {
        let mut machine = PinSessionStateMachine::new();
        machine.select_module(AnalysisModule::Terrain);
        assert_eq!(machine.phase(), Some(PinPhase::ModuleSelected));

        let (id, _token) = start(machine.place_pin(pos(46.0, 7.0)));
        assert_eq!(machine.phase(), Some(PinPhase::Analyzing));

        assert!(machine.finish(
            id,
            AnalysisOutcome::Completed {
                session_id: Some("sess-9".to_string()),
            },
        ));
        assert_eq!(machine.phase(), Some(PinPhase::Complete));
        assert_eq!(
            machine.session().unwrap().session_id.as_deref(),
            Some("sess-9")
        );
    }

    #[test]
    fn reselecting_the_active_module_toggles_it_off() {
        let mut machine = PinSessionStateMachine::new();
        machine.select_module(AnalysisModule::Mobility);
        machine.select_module(AnalysisModule::Mobility);
        assert!(machine.session().is_none());
    }

    #[test]
    fn switching_modules_discards_the_session() {
        let mut machine = PinSessionStateMachine::new();
        machine.select_module(AnalysisModule::Terrain);
        machine.place_pin(pos(10.0, 10.0));
        machine.select_module(AnalysisModule::BuildingDamage);
        let session = machine.session().unwrap();
        assert_eq!(session.module, AnalysisModule::BuildingDamage);
        assert_eq!(session.phase, PinPhase::ModuleSelected);
        assert!(session.position.is_none());
    }

    #[test]
    fn repositioning_cancels_the_first_request_and_drops_its_outcome() {
        let mut machine = PinSessionStateMachine::new();
        machine.select_module(AnalysisModule::Terrain);

        let (first_id, first_token) = start(machine.place_pin(pos(10.0, 10.0)));
        let (second_id, second_token) = start(machine.place_pin(pos(11.0, 11.0)));
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());

        // The first request resolving late must not surface anything.
        assert!(!machine.finish(
            first_id,
            AnalysisOutcome::Completed {
                session_id: Some("stale".to_string()),
            },
        ));
        assert_eq!(machine.phase(), Some(PinPhase::Analyzing));

        assert!(machine.finish(second_id, AnalysisOutcome::Completed { session_id: None }));
        assert_eq!(machine.phase(), Some(PinPhase::Complete));
        assert!(machine.session().unwrap().session_id.is_none());
    }

    #[test]
    fn vision_pin_waits_for_a_question() {
        let mut machine = PinSessionStateMachine::new();
        machine.select_module(AnalysisModule::Vision);
        let effect = machine.place_pin(pos(48.8, 2.3));
        assert!(matches!(effect, SessionEffect::AwaitQuestion));
        assert_eq!(machine.phase(), Some(PinPhase::PinPlaced));

        match machine.submit_query("what is the round structure here?") {
            SessionEffect::StartAnalysis {
                module,
                query,
                position,
                ..
            } => {
                assert_eq!(module, AnalysisModule::Vision);
                assert_eq!(query.as_deref(), Some("what is the round structure here?"));
                assert_eq!(position.lat, 48.8);
            }
            other => panic!("expected StartAnalysis, got {other:?}"),
        }
        assert_eq!(machine.phase(), Some(PinPhase::Analyzing));
    }

    #[test]
    fn vision_follow_ups_after_completion_go_to_the_session_router() {
        let mut machine = PinSessionStateMachine::new();
        let mut router = SessionRouter::new();
        machine.select_module(AnalysisModule::Vision);
        machine.place_pin(pos(48.8, 2.3));

        let (id, _token) = start(machine.submit_query("what is this building?"));
        assert!(machine.finish(
            id,
            AnalysisOutcome::Completed {
                session_id: Some("sess-42".to_string()),
            },
        ));
        router.enter("sess-42".to_string());

        // The completed session owns every later turn; the machine must
        // not restart a fresh analysis for it.
        let effect = machine.submit_query("and how tall is it?");
        assert!(matches!(effect, SessionEffect::None), "got {effect:?}");
        assert_eq!(
            router.route(),
            ChatRoute::Session {
                session_id: "sess-42".to_string(),
            }
        );
    }

    #[test]
    fn comparison_never_reaches_pin_placed() {
        let mut machine = PinSessionStateMachine::new();
        machine.select_module(AnalysisModule::Comparison);
        let effect = machine.place_pin(pos(0.0, 0.0));
        assert!(matches!(effect, SessionEffect::None));
        assert_eq!(machine.phase(), Some(PinPhase::ModuleSelected));

        match machine.submit_query("compare the two most recent captures") {
            SessionEffect::ComparisonQuery { query } => {
                assert_eq!(query, "compare the two most recent captures");
            }
            other => panic!("expected ComparisonQuery, got {other:?}"),
        }
    }

    #[test]
    fn clicks_with_no_module_armed_do_nothing() {
        let mut machine = PinSessionStateMachine::new();
        assert!(matches!(machine.place_pin(pos(1.0, 1.0)), SessionEffect::None));
        assert!(machine.session().is_none());
    }

    #[test]
    fn failed_analysis_lands_in_error_and_cancelled_in_cancelled() {
        let mut machine = PinSessionStateMachine::new();
        machine.select_module(AnalysisModule::Mobility);
        let (id, _t) = start(machine.place_pin(pos(5.0, 5.0)));
        machine.finish(id, AnalysisOutcome::Failed);
        assert_eq!(machine.phase(), Some(PinPhase::Error));

        // Toggle off, then re-arm.
        machine.select_module(AnalysisModule::Mobility);
        machine.select_module(AnalysisModule::Mobility);
        let (id, _t) = start(machine.place_pin(pos(5.0, 5.0)));
        machine.finish(id, AnalysisOutcome::Cancelled);
        assert_eq!(machine.phase(), Some(PinPhase::Cancelled));
    }
}
