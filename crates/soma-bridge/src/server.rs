//! [`BridgeServer`] – the HTTP command/control surface for the remote brain.
//!
//! Read surface: `/status`, `/look`, `/photo`, `/faces`, `/voice/inbox`.
//! Write surface: `/command`, `/head`, `/rgb`, `/speak`, `/combo`,
//! `/face/register` – each maps 1:1 onto an
//! [`ActionCommand`][soma_types::ActionCommand] (or a memory-store call) and
//! returns the execution result synchronously.  Transport input is never
//! trusted: every payload deserialises into the closed command types and
//! passes the same validator the executor applies.
//!
//! Read handlers serve from the latest-value cells and are freely
//! concurrent; write handlers funnel through the executor's per-group
//! serialisation.  Every successful exchange feeds the
//! [`LinkMonitor`][crate::degrade::LinkMonitor] liveness window.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use soma_executor::Executor;
use soma_memory::{FaceRecord, MemoryStore};
use soma_perception::capture::RawCapture;
use soma_perception::cell::LatestReader;
use soma_perception::detect::FaceDetector;
use soma_types::{
    ActionCommand, BodyState, ComboSpec, ExecutionResult, PerceptionSnapshot, RgbMode,
    SensorReadings, SomaError,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

use crate::degrade::{LinkMonitor, LinkState};
use crate::inbox::VoiceInbox;
use crate::security::{Denial, SecurityLayer};

/// Default TCP port for the bridge API.
pub const DEFAULT_PORT: u16 = 8888;

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a request handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
    pub snapshots: LatestReader<PerceptionSnapshot>,
    pub captures: LatestReader<RawCapture>,
    pub memory: Arc<Mutex<MemoryStore>>,
    pub face_detector: Arc<dyn FaceDetector>,
    pub inbox: VoiceInbox,
    pub link: LinkMonitor,
    pub security: Arc<SecurityLayer>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Wire shape of every error: `{"error": {"kind", "message"}}`.
pub(crate) fn error_body(e: &SomaError) -> serde_json::Value {
    json!({ "error": { "kind": e.kind(), "message": e.to_string() } })
}

/// [`SomaError`] carried through an HTTP handler.
#[derive(Debug)]
pub struct ApiError(pub SomaError);

impl From<SomaError> for ApiError {
    fn from(e: SomaError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SomaError::InvalidCommand { .. } => StatusCode::BAD_REQUEST,
            SomaError::DuplicateLowConfidence { .. } => StatusCode::CONFLICT,
            SomaError::SensorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SomaError::TransportUnreachable { .. } => StatusCode::BAD_GATEWAY,
            SomaError::ExecutionFailure { .. }
            | SomaError::Storage(_)
            | SomaError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(error_body(&self.0))).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub body: BodyState,
    pub link: LinkState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<SensorReadings>,
}

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub ts: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub photo_b64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PerceptionSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct FacesResponse {
    pub faces: Vec<FaceRecord>,
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
    pub messages: Vec<soma_types::AudioEvent>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HeadParams {
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub roll: f32,
    #[serde(default)]
    pub pitch: f32,
}

fn default_bps() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RgbParams {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default)]
    pub mode: RgbMode,
    #[serde(default = "default_bps")]
    pub bps: f32,
}

#[derive(Debug, Deserialize)]
pub struct SpeakParams {
    pub text: String,
}

/// Wire shape of `POST /combo`, as the brain sends it.
#[derive(Debug, Deserialize)]
pub struct ComboBody {
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub speak: Option<String>,
    #[serde(default)]
    pub rgb: Option<RgbParams>,
    #[serde(default)]
    pub head: Option<HeadParams>,
}

impl ComboBody {
    /// Lower the wire shape to the executor's combo type.
    fn into_spec(self) -> ComboSpec {
        let mut steps: Vec<ActionCommand> = self
            .actions
            .into_iter()
            .map(|action| ActionCommand::Move {
                action,
                steps: 3,
                speed: 80,
            })
            .collect();
        if let Some(head) = self.head {
            steps.push(ActionCommand::Head {
                yaw: head.yaw,
                roll: head.roll,
                pitch: head.pitch,
            });
        }
        if let Some(rgb) = self.rgb {
            steps.push(ActionCommand::Rgb {
                r: rgb.r,
                g: rgb.g,
                b: rgb.b,
                mode: rgb.mode,
                bps: rgb.bps,
            });
        }
        ComboSpec {
            steps,
            speak: self.speak,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub face: FaceRecord,
}

// ─────────────────────────────────────────────────────────────────────────────
// BridgeServer
// ─────────────────────────────────────────────────────────────────────────────

/// The primary transport server.
pub struct BridgeServer {
    state: AppState,
    host: String,
    port: u16,
}

impl BridgeServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Override the bind host (builder-style).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the bind port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Build the full route table.
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        Router::new()
            .route("/status", get(status))
            .route("/look", get(look))
            .route("/photo", get(photo))
            .route("/faces", get(faces))
            .route("/voice/inbox", get(voice_inbox))
            .route("/command", post(command))
            .route("/head", post(head))
            .route("/rgb", post(rgb))
            .route("/speak", post(speak))
            .route("/combo", post(combo))
            .route("/face/register", post(face_register))
            .layer(middleware::from_fn_with_state(state.clone(), guard))
            .layer(tower_http::cors::CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve forever.
    pub async fn run(self) -> Result<(), SomaError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            SomaError::TransportUnreachable {
                detail: format!("bridge bind {addr}: {e}"),
            }
        })?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener (tests bind to port 0 first).
    pub async fn serve(self, listener: TcpListener) -> Result<(), SomaError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "bridge API listening");
        }
        let router = self.router();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| SomaError::TransportUnreachable {
            detail: format!("bridge server: {e}"),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Auth + rate limit on the way in; liveness touch on the way out.
async fn guard(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if let Err(denial) = state.security.check(peer.ip(), authorization) {
        warn!(peer = %peer, ?denial, "request refused");
        return match denial {
            Denial::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "kind": "unauthorized", "message": message } })),
            )
                .into_response(),
            Denial::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": { "kind": "rate_limited", "message": "slow down" } })),
            )
                .into_response(),
        };
    }

    let request_id = Uuid::new_v4();
    let response = next.run(request).await;
    if response.status().is_success() {
        state.link.touch();
    } else {
        warn!(%request_id, status = %response.status(), "request failed");
    }
    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Read handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        body: state.executor.state(),
        link: state.link.state(),
        sensors: state.snapshots.latest().map(|s| s.sensors),
    })
}

async fn look(State(state): State<AppState>) -> Result<Json<PerceptionSnapshot>, ApiError> {
    state
        .snapshots
        .latest()
        .map(Json)
        .ok_or_else(|| no_perception().into())
}

async fn photo(State(state): State<AppState>) -> Result<Json<PhotoResponse>, ApiError> {
    let capture = state.captures.latest().ok_or_else(no_camera)?;
    Ok(Json(PhotoResponse {
        ts: capture.ts,
        width: capture.frame.width,
        height: capture.frame.height,
        photo_b64: BASE64.encode(&capture.frame.data),
        snapshot: state.snapshots.latest(),
    }))
}

async fn faces(State(state): State<AppState>) -> Result<Json<FacesResponse>, ApiError> {
    let faces = state.memory.lock().unwrap().faces()?;
    Ok(Json(FacesResponse { faces }))
}

async fn voice_inbox(State(state): State<AppState>) -> Json<InboxResponse> {
    Json(InboxResponse {
        messages: state.inbox.drain(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Write handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn command(
    State(state): State<AppState>,
    Json(command): Json<ActionCommand>,
) -> Result<Json<ExecutionResult>, ApiError> {
    Ok(Json(state.executor.execute(command).await?))
}

async fn head(
    State(state): State<AppState>,
    Json(params): Json<HeadParams>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let command = ActionCommand::Head {
        yaw: params.yaw,
        roll: params.roll,
        pitch: params.pitch,
    };
    Ok(Json(state.executor.execute(command).await?))
}

async fn rgb(
    State(state): State<AppState>,
    Json(params): Json<RgbParams>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let command = ActionCommand::Rgb {
        r: params.r,
        g: params.g,
        b: params.b,
        mode: params.mode,
        bps: params.bps,
    };
    Ok(Json(state.executor.execute(command).await?))
}

async fn speak(
    State(state): State<AppState>,
    Json(params): Json<SpeakParams>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let command = ActionCommand::Speak { text: params.text };
    Ok(Json(state.executor.execute(command).await?))
}

async fn combo(
    State(state): State<AppState>,
    Json(body): Json<ComboBody>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let command = ActionCommand::Combo(body.into_spec());
    Ok(Json(state.executor.execute(command).await?))
}

async fn face_register(
    State(state): State<AppState>,
    Json(params): Json<RegisterParams>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let name = valid_face_name(&params.name)?;

    let capture = state.captures.latest().ok_or_else(no_camera)?;
    let mut detected = state.face_detector.detect(&capture.frame)?;
    detected.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let best = detected
        .into_iter()
        .next()
        .ok_or_else(|| SomaError::invalid("no face in view"))?;

    let face = state.memory.lock().unwrap().register(&name, &best.encoding)?;
    info!(name = %face.name, samples = face.samples, "face registered");
    Ok(Json(RegisterResponse { face }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn no_perception() -> SomaError {
    SomaError::SensorUnavailable {
        sensor: "perception".to_string(),
    }
}

fn no_camera() -> SomaError {
    SomaError::SensorUnavailable {
        sensor: "camera".to_string(),
    }
}

fn valid_face_name(raw: &str) -> Result<String, SomaError> {
    let name = raw.trim();
    if name.is_empty() || name.len() > 50 {
        return Err(SomaError::invalid("name must be 1-50 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '.' | '_'))
    {
        return Err(SomaError::invalid("name contains invalid characters"));
    }
    Ok(name.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
