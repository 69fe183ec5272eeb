//! Interactive session wiring: chat turns, virtual camera moves, pins.

use std::sync::Arc;
use std::time::Instant;

use expansion::{CoverageExpansionEngine, run_expansion_search};
use foundation::{LatLng, wrap_lon};
use imagery::ImageryDescriptor;
use interpreter::{Interpretation, ResponseInterpreter};
use render::{MapSurface, RenderCoordinator, UrlSigner};
use session::{
    AnalysisClient, AnalysisModule, AnalysisOutcome, AnalysisRequest, ChatRoute,
    PinSessionStateMachine, ReplyAction, SessionEffect, SessionRouter, TokioFrameScheduler,
    capture_screenshot, run_analysis,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{HttpAnalysisClient, HttpChatBackend, HttpSearchClient, HttpTileIndexFetcher};
use crate::surface::{SharedView, camera_center, visible_bounds};

/// Outcome of one spawned analysis task, delivered back to the main loop.
#[derive(Debug)]
pub struct AnalysisEvent {
    pub request_id: u64,
    pub outcome: AnalysisOutcome,
    pub message: Option<String>,
}

pub struct App {
    interpreter: ResponseInterpreter,
    expansion: CoverageExpansionEngine,
    render: RenderCoordinator,
    machine: PinSessionStateMachine,
    router: SessionRouter,
    surface: Arc<dyn MapSurface>,
    view: SharedView,
    signer: Arc<dyn UrlSigner>,
    fetcher: HttpTileIndexFetcher,
    search: HttpSearchClient,
    analysis: Arc<HttpAnalysisClient>,
    chat: HttpChatBackend,
    current: Option<ImageryDescriptor>,
    events: mpsc::UnboundedSender<AnalysisEvent>,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        interpreter: ResponseInterpreter,
        expansion: CoverageExpansionEngine,
        surface: Arc<dyn MapSurface>,
        view: SharedView,
        signer: Arc<dyn UrlSigner>,
        fetcher: HttpTileIndexFetcher,
        search: HttpSearchClient,
        analysis: Arc<HttpAnalysisClient>,
        chat: HttpChatBackend,
        events: mpsc::UnboundedSender<AnalysisEvent>,
    ) -> Self {
        Self {
            interpreter,
            expansion,
            render: RenderCoordinator::new(),
            machine: PinSessionStateMachine::new(),
            router: SessionRouter::new(),
            surface,
            view,
            signer,
            fetcher,
            search,
            analysis,
            chat,
            current: None,
            events,
        }
    }

    /// Handles one line from the terminal. Returns `false` on quit.
    pub async fn handle_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("/quit") => return false,
            Some("/state") => self.print_state(),
            Some("/module") => self.select_module(parts.next()),
            Some("/pin") => {
                let lat = parts.next().and_then(|v| v.parse::<f64>().ok());
                let lng = parts.next().and_then(|v| v.parse::<f64>().ok());
                match (lat, lng) {
                    (Some(lat), Some(lng)) => self.place_pin(lat, lng).await,
                    _ => println!("usage: /pin <lat> <lng>"),
                }
            }
            Some("/pan") => {
                let dlat = parts.next().and_then(|v| v.parse::<f64>().ok());
                let dlng = parts.next().and_then(|v| v.parse::<f64>().ok());
                match (dlat, dlng) {
                    (Some(dlat), Some(dlng)) => self.pan(dlat, dlng).await,
                    _ => println!("usage: /pan <dlat> <dlng>"),
                }
            }
            Some("/zoom") => match parts.next().and_then(|v| v.parse::<u8>().ok()) {
                Some(zoom) => self.zoom(zoom).await,
                None => println!("usage: /zoom <level>"),
            },
            _ => self.chat_turn(line).await,
        }
        true
    }

    /// Periodic housekeeping driven by the main loop's timer.
    pub fn tick(&mut self) {
        self.expansion.tick(Instant::now());
    }

    async fn chat_turn(&mut self, text: &str) {
        info!(turn = %Uuid::new_v4(), "chat turn");

        // An armed comparison or pinned vision session consumes the text
        // before it can reach any chat endpoint.
        match self.machine.submit_query(text) {
            SessionEffect::StartAnalysis {
                request_id,
                module,
                position,
                query,
                token,
            } => {
                self.spawn_analysis(request_id, module, position, query, token).await;
                return;
            }
            SessionEffect::ComparisonQuery { query } => {
                self.comparison_turn(&query).await;
                return;
            }
            SessionEffect::AwaitQuestion | SessionEffect::None => {}
        }

        if let ChatRoute::Session { session_id } = self.router.route() {
            match self.analysis.continue_session(&session_id, text).await {
                Ok(reply) => {
                    if self.router.observe_reply(&reply) == ReplyAction::ReplayThroughGeneral {
                        info!("analysis session closed; replaying through the general path");
                        self.general_turn(text).await;
                    } else {
                        println!("{}", reply.response);
                    }
                }
                Err(err) => warn!("session turn failed: {err}"),
            }
            return;
        }

        self.general_turn(text).await;
    }

    async fn general_turn(&mut self, text: &str) {
        let resp = match self.chat.ask(text).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!("chat backend unavailable: {err}");
                return;
            }
        };
        if let Some(text) = resp.response.as_deref() {
            println!("{text}");
        }

        match self.interpreter.interpret(&resp, &self.fetcher).await {
            Ok(Interpretation::NewImagery { descriptor, camera }) => {
                self.apply_descriptor(descriptor, camera).await;
            }
            Ok(Interpretation::NavigateTo(camera)) => {
                if let Err(err) = self.render.frame(&camera, self.surface.as_ref()) {
                    warn!("camera move failed: {err}");
                }
            }
            Ok(Interpretation::NonVisualizable {
                camera,
                collection,
                reason,
            }) => {
                println!("(no renderable imagery for {collection}: {reason})");
                if let Err(err) = self.render.frame(&camera, self.surface.as_ref()) {
                    warn!("camera move failed: {err}");
                }
            }
            Ok(Interpretation::NoChange) => {}
            Err(err) => warn!("response not interpretable, keeping current view: {err}"),
        }
    }

    async fn apply_descriptor(
        &mut self,
        descriptor: ImageryDescriptor,
        camera: viewport::CameraTarget,
    ) {
        match self
            .render
            .apply(&descriptor, &camera, self.surface.as_ref(), self.signer.as_ref())
            .await
        {
            Ok(outcome) => info!("render: {outcome:?}"),
            Err(err) => {
                warn!("render failed: {err}");
                return;
            }
        }
        self.expansion.observe_descriptor(&descriptor);
        self.current = Some(descriptor);
    }

    /// Virtual camera pan; a settle event follows immediately since there
    /// is no animation.
    async fn pan(&mut self, dlat: f64, dlng: f64) {
        let Some(camera) = self.current_camera() else {
            println!("no camera yet; run a query first");
            return;
        };
        let center = camera_center(&camera);
        match LatLng::new(
            (center.lat + dlat).clamp(-85.0, 85.0),
            wrap_lon(center.lng + dlng),
        ) {
            Ok(center) => {
                let target = viewport::CameraTarget::CenterZoom {
                    center,
                    zoom: camera.zoom(),
                };
                if let Err(err) = self.render.frame(&target, self.surface.as_ref()) {
                    warn!("camera move failed: {err}");
                    return;
                }
                self.camera_settled().await;
            }
            Err(err) => warn!("pan rejected: {err}"),
        }
    }

    async fn zoom(&mut self, zoom: u8) {
        let Some(camera) = self.current_camera() else {
            println!("no camera yet; run a query first");
            return;
        };
        let target = viewport::CameraTarget::CenterZoom {
            center: camera_center(&camera),
            zoom: zoom.min(viewport::MAX_ZOOM),
        };
        if let Err(err) = self.render.frame(&target, self.surface.as_ref()) {
            warn!("camera move failed: {err}");
            return;
        }
        self.camera_settled().await;
    }

    async fn camera_settled(&mut self) {
        let Some(camera) = self.current_camera() else {
            return;
        };
        let bounds = match visible_bounds(&camera) {
            Ok(bounds) => bounds,
            Err(err) => {
                warn!("camera bounds unusable: {err}");
                return;
            }
        };
        let Some(request) = self.expansion.on_camera_settled(bounds, Instant::now()) else {
            return;
        };
        info!("expanding item coverage to {:?}", request.bounds.to_wsen());

        match run_expansion_search(&self.search, &request.query).await {
            Ok(items) => {
                let Some(current) = self.current.as_ref() else {
                    self.expansion.abandon();
                    return;
                };
                let replacement = self.expansion.apply_result(current, &request, items);
                // Keep the user's camera; expansion only swaps tiles.
                let replaced = self
                    .render
                    .apply(&replacement, &camera, self.surface.as_ref(), self.signer.as_ref())
                    .await;
                match replaced {
                    Ok(outcome) => info!("expansion render: {outcome:?}"),
                    Err(err) => warn!("expansion render failed: {err}"),
                }
                self.expansion.observe_descriptor(&replacement);
                self.current = Some(replacement);
            }
            Err(err) => {
                warn!("coverage expansion abandoned: {err}");
                self.expansion.abandon();
            }
        }
    }

    fn select_module(&mut self, name: Option<&str>) {
        let module = match name {
            Some("terrain") => AnalysisModule::Terrain,
            Some("mobility") => AnalysisModule::Mobility,
            Some("vision") => AnalysisModule::Vision,
            Some("damage") => AnalysisModule::BuildingDamage,
            Some("comparison") => AnalysisModule::Comparison,
            _ => {
                println!("usage: /module terrain|mobility|vision|damage|comparison");
                return;
            }
        };
        self.machine.select_module(module);
        match self.machine.phase() {
            Some(phase) => println!("module {module:?} armed ({phase:?})"),
            None => println!("module {module:?} toggled off"),
        }
    }

    async fn place_pin(&mut self, lat: f64, lng: f64) {
        let position = match LatLng::new(lat, lng) {
            Ok(p) => p,
            Err(err) => {
                println!("invalid pin position: {err}");
                return;
            }
        };
        match self.machine.place_pin(position) {
            SessionEffect::StartAnalysis {
                request_id,
                module,
                position,
                query,
                token,
            } => self.spawn_analysis(request_id, module, position, query, token).await,
            SessionEffect::AwaitQuestion => {
                println!("pin placed; ask a question about this location");
            }
            SessionEffect::ComparisonQuery { .. } | SessionEffect::None => {}
        }
    }

    async fn spawn_analysis(
        &mut self,
        request_id: u64,
        module: AnalysisModule,
        position: LatLng,
        query: Option<String>,
        token: tokio_util::sync::CancellationToken,
    ) {
        let screenshot =
            capture_screenshot(self.surface.as_ref(), None, &TokioFrameScheduler).await;
        let request = AnalysisRequest {
            module,
            lat: position.lat,
            lng: position.lng,
            query,
            screenshot,
        };
        let client = Arc::clone(&self.analysis);
        let events = self.events.clone();
        info!(?module, request_id, "analysis started");
        tokio::spawn(async move {
            let event = match run_analysis(client.as_ref(), &request, &token).await {
                Ok(Some(reply)) => AnalysisEvent {
                    request_id,
                    outcome: AnalysisOutcome::Completed {
                        session_id: reply.session_id.clone(),
                    },
                    message: Some(reply.response),
                },
                Ok(None) => AnalysisEvent {
                    request_id,
                    outcome: AnalysisOutcome::Cancelled,
                    message: None,
                },
                Err(err) => AnalysisEvent {
                    request_id,
                    outcome: AnalysisOutcome::Failed,
                    message: Some(format!("analysis failed: {err}")),
                },
            };
            // Receiver dropping means the app is shutting down.
            let _ = events.send(event);
        });
    }

    /// Comparison takes the whole visible scene, no pin.
    async fn comparison_turn(&mut self, query: &str) {
        let center = self
            .current_camera()
            .map(|c| camera_center(&c))
            .unwrap_or_else(|| LatLng { lat: 0.0, lng: 0.0 });
        let screenshot =
            capture_screenshot(self.surface.as_ref(), None, &TokioFrameScheduler).await;
        let request = AnalysisRequest {
            module: AnalysisModule::Comparison,
            lat: center.lat,
            lng: center.lng,
            query: Some(query.to_string()),
            screenshot,
        };
        match self.analysis.analyze(&request).await {
            Ok(reply) => println!("{}", reply.response),
            Err(err) => warn!("comparison failed: {err}"),
        }
    }

    /// Delivers a spawned analysis outcome. Stale outcomes (superseded by a
    /// repositioned pin) are dropped by the state machine and print nothing.
    pub fn analysis_finished(&mut self, event: AnalysisEvent) {
        let accepted = self.machine.finish(event.request_id, event.outcome);
        if !accepted {
            return;
        }
        if let Some(message) = event.message {
            println!("{message}");
        }
        if let Some(session_id) = self
            .machine
            .session()
            .and_then(|s| s.session_id.clone())
        {
            self.router.enter(session_id);
        }
    }

    fn current_camera(&self) -> Option<viewport::CameraTarget> {
        self.view.lock().ok()?.camera.clone()
    }

    fn print_state(&self) {
        match &self.current {
            Some(d) => println!(
                "collection={} items={} primary_url={} origin={:?}",
                d.collection,
                d.items.len(),
                d.signature().primary_url,
                d.origin
            ),
            None => println!("no imagery on screen"),
        }
        if let Some(state) = self.expansion.state() {
            println!(
                "expansion: tracking {:?} expanding={}",
                state.original_bounds.to_wsen(),
                state.expanding
            );
        }
        if let Some(session) = self.machine.session() {
            println!("analysis: {:?} phase {:?}", session.module, session.phase);
        }
        if let Some(id) = self.router.active_session() {
            println!("chat routed to session {id}");
        }
    }
}
