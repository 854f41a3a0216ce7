//! Session state machine for an interactive KMeans run.
//!
//! All mutation happens in `SessionController`: each user action and each
//! engine completion returns the effects the host runtime must carry out.
//! The controller performs no I/O itself; `drive` is the async executor used
//! by hosts that can simply await the engine.

use std::{collections::VecDeque, fmt};

use shared::{
    domain::{AxisLimits, Centroid, ClusterCount, DataPoint, InitMethod},
    protocol::{
        EngineIntent, EngineRequest, KmeansRequest, ManualCentroidsRequest, ResetRequest,
        StatusResponse,
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    mapping::{to_data, ScreenPoint, SurfaceSize},
    render::{DisplayList, RenderSurface},
    EngineError, EngineHandle, EngineImage, EngineResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No dataset yet.
    Idle,
    Ready,
    CollectingCentroids,
    Stepping,
    /// Terminal until reset or a new dataset.
    Converged,
}

impl SessionPhase {
    pub fn label(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Ready => "ready",
            SessionPhase::CollectingCentroids => "collecting centroids",
            SessionPhase::Stepping => "stepping",
            SessionPhase::Converged => "converged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Converged,
    AlreadyConverged,
    IncompleteCentroids {
        expected: ClusterCount,
        selected: usize,
    },
    RequestInFlight(EngineIntent),
    NoDataset,
    InvalidClusterCount(u32),
    ManualPlacementUnavailable,
    Acknowledged(String),
    EngineReported {
        intent: EngineIntent,
        message: String,
    },
    UnexpectedResponse {
        intent: EngineIntent,
        kind: &'static str,
    },
    TransportFailure {
        intent: EngineIntent,
        detail: String,
    },
}

impl Notice {
    pub fn severity(&self) -> NoticeSeverity {
        match self {
            Notice::Converged | Notice::Acknowledged(_) => NoticeSeverity::Info,
            Notice::AlreadyConverged
            | Notice::IncompleteCentroids { .. }
            | Notice::RequestInFlight(_)
            | Notice::NoDataset
            | Notice::InvalidClusterCount(_)
            | Notice::ManualPlacementUnavailable => NoticeSeverity::Warning,
            Notice::EngineReported { .. }
            | Notice::UnexpectedResponse { .. }
            | Notice::TransportFailure { .. } => NoticeSeverity::Error,
        }
    }

    /// Validation notices are raised before any request is sent.
    pub fn is_validation(&self) -> bool {
        self.severity() == NoticeSeverity::Warning
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Converged => f.write_str("KMeans has converged!"),
            Notice::AlreadyConverged => f.write_str("KMeans has already converged!"),
            Notice::IncompleteCentroids { expected, selected } => write!(
                f,
                "Please select exactly {expected} centroids ({selected} selected)"
            ),
            Notice::RequestInFlight(intent) => {
                write!(f, "Waiting for the engine to finish {intent}")
            }
            Notice::NoDataset => f.write_str("Generate a dataset first"),
            Notice::InvalidClusterCount(k) => {
                write!(f, "Number of clusters must be at least 1 (got {k})")
            }
            Notice::ManualPlacementUnavailable => f.write_str(
                "The engine returned a pre-rendered dataset; manual centroid placement needs point data",
            ),
            Notice::Acknowledged(message) => f.write_str(message),
            Notice::EngineReported { message, .. } => f.write_str(message),
            Notice::UnexpectedResponse { intent, kind } => {
                write!(f, "Unexpected {kind} reply to {intent}")
            }
            Notice::TransportFailure { intent, detail } => {
                write!(f, "Engine request {intent} failed: {detail}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Dispatch(EngineRequest),
    Notify(Notice),
    /// The visual output changed and should be repainted.
    Redraw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    points: Vec<DataPoint>,
    limits: Option<AxisLimits>,
}

impl Dataset {
    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    /// Absent when the engine only sent a pre-rendered frame.
    pub fn limits(&self) -> Option<&AxisLimits> {
        self.limits.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    dataset: Option<Dataset>,
    centroids: Vec<Centroid>,
    init_method: InitMethod,
    k: ClusterCount,
    converged: bool,
    last_image: Option<EngineImage>,
    phase: SessionPhase,
    in_flight: Option<EngineIntent>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            dataset: None,
            centroids: Vec::new(),
            init_method: InitMethod::default(),
            k: ClusterCount::default(),
            converged: false,
            last_image: None,
            phase: SessionPhase::Idle,
            in_flight: None,
        }
    }
}

impl SessionState {
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn axis_limits(&self) -> Option<&AxisLimits> {
        self.dataset.as_ref().and_then(Dataset::limits)
    }

    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    pub fn init_method(&self) -> InitMethod {
        self.init_method
    }

    pub fn k(&self) -> ClusterCount {
        self.k
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn last_image(&self) -> Option<&EngineImage> {
        self.last_image.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn in_flight(&self) -> Option<EngineIntent> {
        self.in_flight
    }

    fn manual_incomplete(&self) -> bool {
        self.init_method.is_manual() && self.centroids.len() != self.k.as_usize()
    }
}

/// What the results area should show right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisualOutput<'a> {
    Empty,
    Image(&'a EngineImage),
    Overlay(&'a DisplayList),
}

pub struct SessionController {
    state: SessionState,
    surface: RenderSurface,
    overlay: DisplayList,
}

impl SessionController {
    pub fn new(surface_size: SurfaceSize) -> Self {
        Self::with_parameters(surface_size, ClusterCount::default(), InitMethod::default())
    }

    pub fn with_parameters(surface_size: SurfaceSize, k: ClusterCount, init_method: InitMethod) -> Self {
        Self {
            state: SessionState {
                k,
                init_method,
                ..SessionState::default()
            },
            surface: RenderSurface::new(surface_size),
            overlay: DisplayList::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn surface_size(&self) -> SurfaceSize {
        self.surface.size()
    }

    pub fn overlay(&self) -> &DisplayList {
        &self.overlay
    }

    pub fn display(&self) -> VisualOutput<'_> {
        if self.state.phase == SessionPhase::CollectingCentroids {
            return VisualOutput::Overlay(&self.overlay);
        }
        match &self.state.last_image {
            Some(image) => VisualOutput::Image(image),
            None if !self.overlay.is_empty() => VisualOutput::Overlay(&self.overlay),
            None => VisualOutput::Empty,
        }
    }

    /// Whether a click on the surface would be turned into a centroid.
    pub fn accepts_clicks(&self) -> bool {
        self.state.phase == SessionPhase::CollectingCentroids
            && self.state.in_flight.is_none()
            && self.state.axis_limits().is_some()
            && self.state.centroids.len() < self.state.k.as_usize()
    }

    pub fn remaining_centroids(&self) -> usize {
        if !self.state.init_method.is_manual() {
            return 0;
        }
        self.state
            .k
            .as_usize()
            .saturating_sub(self.state.centroids.len())
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    pub fn generate_dataset(&mut self) -> Vec<SessionEffect> {
        if let Some(rejected) = self.busy() {
            return rejected;
        }
        self.dispatch(EngineRequest::GenerateDataset)
    }

    /// Parameter changes are rejected while a request is outstanding.
    pub fn set_k(&mut self, k: u32) -> Vec<SessionEffect> {
        let k = match ClusterCount::new(k) {
            Ok(k) => k,
            Err(_) => return vec![SessionEffect::Notify(Notice::InvalidClusterCount(k))],
        };
        if k == self.state.k {
            return Vec::new();
        }
        if let Some(rejected) = self.busy() {
            return rejected;
        }
        info!(from = %self.state.k, to = %k, "cluster count changed");
        self.state.k = k;
        self.invalidate_manual_progress()
    }

    pub fn set_init_method(&mut self, init_method: InitMethod) -> Vec<SessionEffect> {
        if init_method == self.state.init_method {
            return Vec::new();
        }
        if let Some(rejected) = self.busy() {
            return rejected;
        }
        info!(from = %self.state.init_method, to = %init_method, "init method changed");
        self.state.init_method = init_method;
        let mut effects = self.invalidate_manual_progress();
        if self.state.phase == SessionPhase::CollectingCentroids
            && self.state.axis_limits().is_none()
        {
            effects.push(SessionEffect::Notify(Notice::ManualPlacementUnavailable));
        }
        effects
    }

    /// Clicks outside manual collection are ignored without a notice.
    pub fn place_centroid(&mut self, at: ScreenPoint) -> Vec<SessionEffect> {
        if !self.accepts_clicks() || !self.surface.size().contains(at) {
            return Vec::new();
        }
        let point = match to_data(at, self.state.axis_limits(), self.surface.size()) {
            Ok(point) => point,
            Err(err) => {
                debug!(%err, "ignoring click that cannot be mapped");
                return Vec::new();
            }
        };

        self.state.centroids.push(Centroid::from(point));
        self.rerender();
        let mut effects = vec![SessionEffect::Redraw];

        let placed = self.state.centroids.len();
        debug!(placed, k = %self.state.k, x = point.x, y = point.y, "centroid placed");
        if placed == self.state.k.as_usize() {
            info!(k = %self.state.k, "manual centroids complete");
            self.state.phase = SessionPhase::Stepping;
            effects.extend(self.dispatch(EngineRequest::Manual(ManualCentroidsRequest {
                centroids: self.state.centroids.clone(),
                k: self.state.k,
            })));
        }
        effects
    }

    pub fn step(&mut self) -> Vec<SessionEffect> {
        match self.state.phase {
            SessionPhase::Idle => return vec![SessionEffect::Notify(Notice::NoDataset)],
            SessionPhase::Converged => {
                return vec![SessionEffect::Notify(Notice::AlreadyConverged)]
            }
            _ => {}
        }
        if let Some(rejected) = self.incomplete_centroids() {
            return rejected;
        }
        if let Some(rejected) = self.busy() {
            return rejected;
        }
        self.dispatch(EngineRequest::Step(self.kmeans_request()))
    }

    /// Allowed even after convergence; the engine is asked again.
    pub fn converge(&mut self) -> Vec<SessionEffect> {
        if self.state.phase == SessionPhase::Idle {
            return vec![SessionEffect::Notify(Notice::NoDataset)];
        }
        if let Some(rejected) = self.incomplete_centroids() {
            return rejected;
        }
        if let Some(rejected) = self.busy() {
            return rejected;
        }
        self.dispatch(EngineRequest::Run(self.kmeans_request()))
    }

    pub fn reset(&mut self) -> Vec<SessionEffect> {
        if self.state.phase == SessionPhase::Idle {
            return vec![SessionEffect::Notify(Notice::NoDataset)];
        }
        if let Some(rejected) = self.busy() {
            return rejected;
        }
        self.dispatch(EngineRequest::Reset(ResetRequest {
            k: self.state.k,
            init_method: self.state.init_method,
        }))
    }

    // ------------------------------------------------------------------
    // Engine completions
    // ------------------------------------------------------------------

    pub fn complete(
        &mut self,
        intent: EngineIntent,
        outcome: Result<EngineResponse, EngineError>,
    ) -> Vec<SessionEffect> {
        if self.state.in_flight != Some(intent) {
            warn!(
                %intent,
                outstanding = ?self.state.in_flight,
                "dropping completion that does not match the outstanding request"
            );
            return Vec::new();
        }
        self.state.in_flight = None;

        let response = match outcome {
            Ok(response) => response,
            Err(err) if err.is_connectivity() => {
                error!(%intent, %err, "engine unreachable");
                return vec![SessionEffect::Notify(Notice::TransportFailure {
                    intent,
                    detail: err.to_string(),
                })];
            }
            Err(err) => {
                error!(%intent, %err, "engine request failed");
                return vec![SessionEffect::Notify(Notice::EngineReported {
                    intent,
                    message: err.to_string(),
                })];
            }
        };

        if let EngineResponse::Status(StatusResponse {
            error: Some(message),
            ..
        }) = &response
        {
            warn!(%intent, %message, "engine reported an error");
            return vec![SessionEffect::Notify(Notice::EngineReported {
                intent,
                message: message.clone(),
            })];
        }

        match intent {
            EngineIntent::GenerateDataset => self.on_dataset(response),
            EngineIntent::StepKmeans => self.on_step(response),
            EngineIntent::RunKmeans => self.on_run(response),
            EngineIntent::ResetKmeans => self.on_reset(response),
            EngineIntent::ManualKmeans => self.on_manual_ack(response),
        }
    }

    fn on_dataset(&mut self, response: EngineResponse) -> Vec<SessionEffect> {
        let (dataset, image) = match response {
            EngineResponse::Dataset { points, limits } => (
                Dataset {
                    points,
                    limits: Some(limits),
                },
                None,
            ),
            EngineResponse::Image(image) => (
                Dataset {
                    points: Vec::new(),
                    limits: None,
                },
                Some(image),
            ),
            other => return self.unexpected(EngineIntent::GenerateDataset, other),
        };

        info!(
            points = dataset.points.len(),
            structured = dataset.limits.is_some(),
            "dataset generated"
        );
        self.state.dataset = Some(dataset);
        self.state.centroids.clear();
        self.state.converged = false;
        self.state.last_image = image;
        self.state.phase = self.settled_phase();
        self.rerender();

        let mut effects = vec![SessionEffect::Redraw];
        if self.state.phase == SessionPhase::CollectingCentroids
            && self.state.axis_limits().is_none()
        {
            effects.push(SessionEffect::Notify(Notice::ManualPlacementUnavailable));
        }
        effects
    }

    fn on_step(&mut self, response: EngineResponse) -> Vec<SessionEffect> {
        match response {
            EngineResponse::Status(StatusResponse {
                converged: true, ..
            }) => self.mark_converged(),
            EngineResponse::Image(image) => {
                self.state.last_image = Some(image);
                self.state.phase = SessionPhase::Stepping;
                vec![SessionEffect::Redraw]
            }
            other => self.unexpected(EngineIntent::StepKmeans, other),
        }
    }

    fn on_run(&mut self, response: EngineResponse) -> Vec<SessionEffect> {
        match response {
            EngineResponse::Image(image) => {
                self.state.last_image = Some(image);
                let mut effects = vec![SessionEffect::Redraw];
                effects.extend(self.mark_converged());
                effects
            }
            EngineResponse::Status(StatusResponse {
                converged: true, ..
            }) => self.mark_converged(),
            other => self.unexpected(EngineIntent::RunKmeans, other),
        }
    }

    fn on_reset(&mut self, response: EngineResponse) -> Vec<SessionEffect> {
        let image = match response {
            EngineResponse::Image(image) => image,
            other => return self.unexpected(EngineIntent::ResetKmeans, other),
        };
        if self.state.init_method.is_manual() {
            self.state.centroids.clear();
        }
        self.state.converged = false;
        self.state.last_image = Some(image);
        self.state.phase = self.settled_phase();
        self.rerender();
        info!(phase = self.state.phase.label(), "session reset");
        vec![SessionEffect::Redraw]
    }

    fn on_manual_ack(&mut self, response: EngineResponse) -> Vec<SessionEffect> {
        match response {
            EngineResponse::Status(StatusResponse { message, .. }) => {
                let message = message.unwrap_or_else(|| "Centroids accepted".to_string());
                vec![SessionEffect::Notify(Notice::Acknowledged(message))]
            }
            other => self.unexpected(EngineIntent::ManualKmeans, other),
        }
    }

    fn unexpected(&self, intent: EngineIntent, response: EngineResponse) -> Vec<SessionEffect> {
        if let EngineResponse::Status(StatusResponse {
            message: Some(message),
            ..
        }) = &response
        {
            return vec![SessionEffect::Notify(Notice::Acknowledged(message.clone()))];
        }
        warn!(%intent, kind = response.kind(), "unexpected engine reply");
        vec![SessionEffect::Notify(Notice::UnexpectedResponse {
            intent,
            kind: response.kind(),
        })]
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn mark_converged(&mut self) -> Vec<SessionEffect> {
        self.state.converged = true;
        self.state.phase = SessionPhase::Converged;
        info!("kmeans converged");
        vec![SessionEffect::Notify(Notice::Converged)]
    }

    fn settled_phase(&self) -> SessionPhase {
        if self.state.dataset.is_none() {
            SessionPhase::Idle
        } else if self.state.init_method.is_manual()
            && self.state.centroids.len() < self.state.k.as_usize()
        {
            SessionPhase::CollectingCentroids
        } else {
            SessionPhase::Ready
        }
    }

    /// k and the init method define what a centroid set means, so either change discards it.
    fn invalidate_manual_progress(&mut self) -> Vec<SessionEffect> {
        self.state.centroids.clear();
        self.state.converged = false;
        self.state.phase = self.settled_phase();
        self.rerender();
        vec![SessionEffect::Redraw]
    }

    fn incomplete_centroids(&self) -> Option<Vec<SessionEffect>> {
        self.state.manual_incomplete().then(|| {
            vec![SessionEffect::Notify(Notice::IncompleteCentroids {
                expected: self.state.k,
                selected: self.state.centroids.len(),
            })]
        })
    }

    fn busy(&self) -> Option<Vec<SessionEffect>> {
        self.state
            .in_flight
            .map(|intent| vec![SessionEffect::Notify(Notice::RequestInFlight(intent))])
    }

    fn kmeans_request(&self) -> KmeansRequest {
        KmeansRequest::new(self.state.k, self.state.init_method, &self.state.centroids)
    }

    fn dispatch(&mut self, request: EngineRequest) -> Vec<SessionEffect> {
        let intent = request.intent();
        debug!(%intent, "dispatching engine request");
        self.state.in_flight = Some(intent);
        vec![SessionEffect::Dispatch(request)]
    }

    fn rerender(&mut self) {
        let (points, limits) = match &self.state.dataset {
            Some(dataset) => (dataset.points(), dataset.limits()),
            None => (&[][..], None),
        };
        if limits.is_none() {
            self.overlay = DisplayList::default();
            return;
        }
        self.surface
            .render(&mut self.overlay, points, &self.state.centroids, limits);
    }
}

/// Everything a driven action produced besides the requests themselves.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DriveReport {
    pub notices: Vec<Notice>,
    pub requests: Vec<EngineIntent>,
    pub redraws: usize,
}

impl DriveReport {
    pub fn has_errors(&self) -> bool {
        self.notices
            .iter()
            .any(|notice| notice.severity() == NoticeSeverity::Error)
    }
}

/// Execute effects against an engine until none remain.
pub async fn drive(
    controller: &mut SessionController,
    engine: &(impl EngineHandle + ?Sized),
    effects: Vec<SessionEffect>,
) -> DriveReport {
    let mut report = DriveReport::default();
    let mut queue: VecDeque<SessionEffect> = effects.into();

    while let Some(effect) = queue.pop_front() {
        match effect {
            SessionEffect::Dispatch(request) => {
                let intent = request.intent();
                report.requests.push(intent);
                let outcome = engine.send(&request).await;
                queue.extend(controller.complete(intent, outcome));
            }
            SessionEffect::Notify(notice) => report.notices.push(notice),
            SessionEffect::Redraw => report.redraws += 1,
        }
    }
    report
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
