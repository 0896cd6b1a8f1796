//! HTTP + WebSocket presenter adapter for CrisisEngine
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /scan - Stateless scan of one text
//! - POST /entry/new - Open an entry
//! - GET /entry/{id} - Current AlertState
//! - POST /entry/{id}/revision - Submit a text snapshot (debounced)
//! - POST /entry/{id}/intent - Forward a user intent or UI action
//! - POST /entry/{id}/presented - Banner is on screen
//! - DELETE /entry/{id} - Archive entry
//! - GET /entry/{id}/audit - Audit rows for the entry
//! - WS /ws/{id} - AlertState pushes; accepts intents

use axum::{
    extract::{ws::{Message, WebSocket}, Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::core::audit::AuditError;
use crate::core::config::EngineConfig;
use crate::core::engine::{CrisisEngine, EngineError};
use crate::core::presenter::BroadcastPresenter;
use crate::types::{
    AlertState, AuditRecord, CrisisAssessment, JournalRevision, TransitionOutput, TriggerSource, UserIntent,
};

/// App state
pub struct AppState {
    pub engine: Arc<CrisisEngine>,
    pub presenter: Arc<BroadcastPresenter>,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewEntryRequest {
    /// Caller-chosen id; generated when absent
    pub entry_id: Option<String>,
    pub trigger_source: Option<String>,
    pub require_acknowledge: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct NewEntryResponse {
    pub entry_id: String,
    pub websocket_url: String,
    pub state: AlertState,
}

#[derive(Debug, Deserialize)]
pub struct RevisionRequest {
    pub text: String,
    pub revision_seq: u64,
}

/// Either an intent name or one of the app's UI callbacks
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IntentRequest {
    pub intent: Option<UserIntent>,
    pub ui_action: Option<String>,
}

impl IntentRequest {
    fn resolve(&self) -> Option<UserIntent> {
        self.intent
            .or_else(|| self.ui_action.as_deref().and_then(UserIntent::from_ui_action))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub entries_active: usize,
    pub scanner_available: bool,
    pub lexicon_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

impl From<EngineError> for (StatusCode, Json<ErrorResponse>) {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::UnknownEntry(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        }
    }
}

/// Create the API router with an engine built from `config`
pub fn create_router(config: EngineConfig) -> Result<Router, AuditError> {
    let (scanner, _) = config.build_scanner();
    let audit = config.build_audit_sink()?;
    let presenter = Arc::new(BroadcastPresenter::new());
    let engine = CrisisEngine::start(config, scanner, presenter.clone(), audit);
    Ok(router(engine, presenter))
}

/// Router over an existing engine. `presenter` must be the one the engine
/// notifies.
pub fn router(engine: Arc<CrisisEngine>, presenter: Arc<BroadcastPresenter>) -> Router {
    let state = Arc::new(AppState {
        engine,
        presenter,
        next_id: AtomicU64::new(1),
    });

    Router::new()
        .route("/health", get(health))
        .route("/scan", post(scan))
        .route("/entry/new", post(create_entry))
        .route("/entry/:id", get(get_entry).delete(close_entry))
        .route("/entry/:id/revision", post(add_revision))
        .route("/entry/:id/intent", post(post_intent))
        .route("/entry/:id/presented", post(presented))
        .route("/entry/:id/audit", get(get_audit))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let scanner = state.engine.scanner();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        entries_active: state.engine.entry_count().await,
        scanner_available: scanner.is_available(),
        lexicon_version: scanner.lexicon().map(|l| l.version().to_string()),
    })
}

/// Scan without touching any entry
async fn scan(State(state): State<Arc<AppState>>, Json(req): Json<ScanRequest>) -> Json<CrisisAssessment> {
    let revision = JournalRevision::new("adhoc", req.text, 0);
    Json(state.engine.scanner().assess(&revision))
}

async fn create_entry(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewEntryRequest>,
) -> Result<Json<NewEntryResponse>, ApiError> {
    let entry_id = match req.entry_id {
        Some(id) if id.trim().is_empty() => {
            return Err(api_error(StatusCode::BAD_REQUEST, "entry_id must not be empty"));
        }
        Some(id) => id,
        None => generate_entry_id(&state.next_id),
    };
    let trigger: TriggerSource = req.trigger_source.as_deref().unwrap_or("journal").into();
    let alert = state.engine.open_entry(&entry_id, trigger, req.require_acknowledge).await;

    Ok(Json(NewEntryResponse {
        websocket_url: format!("/ws/{}", entry_id),
        entry_id,
        state: alert,
    }))
}

async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlertState>, StatusCode> {
    state.engine.alert_state(&id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn add_revision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RevisionRequest>,
) -> Result<StatusCode, ApiError> {
    state.engine.on_text_revision(&id, req.text, req.revision_seq).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Rejected intents come back as 409 with the unchanged state
async fn post_intent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<IntentRequest>,
) -> Result<(StatusCode, Json<TransitionOutput>), ApiError> {
    let intent = req
        .resolve()
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "expected a known `intent` or `ui_action`"))?;
    let output = state.engine.on_intent(&id, intent).await?;
    Ok((transition_status(&output), Json(output)))
}

async fn presented(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TransitionOutput>), ApiError> {
    let output = state.engine.on_presented(&id).await?;
    Ok((transition_status(&output), Json(output)))
}

async fn close_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlertState>, ApiError> {
    Ok(Json(state.engine.close_entry(&id).await?))
}

/// Works for archived entries too, as long as the sink is queryable
async fn get_audit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    let records = state
        .engine
        .audit_records(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_IMPLEMENTED, "audit sink is not queryable"))?;
    if records.is_empty() {
        return Err(api_error(StatusCode::NOT_FOUND, format!("no audit records for {}", id)));
    }
    Ok(Json(records))
}

fn transition_status(output: &TransitionOutput) -> StatusCode {
    if output.reason.is_rejection() {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    }
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let current = state.engine.alert_state(&id).await.ok_or(StatusCode::NOT_FOUND)?;
    let rx = state.presenter.subscribe(&id);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, state, id, current, rx).await;
    }))
}

/// Push the current state, then stream changes out and intents in until
/// either side goes away
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    entry_id: String,
    current: AlertState,
    mut rx: broadcast::Receiver<AlertState>,
) {
    let (mut sender, mut receiver) = socket.split();
    info!(entry_id = %entry_id, "presenter connected");

    if send_state(&mut sender, &current).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(alert) => {
                    if send_state(&mut sender, &alert).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(entry_id = %entry_id, skipped, "presenter lagged, resending current state");
                    match state.engine.alert_state(&entry_id).await {
                        Some(alert) => {
                            if send_state(&mut sender, &alert).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<IntentRequest>(&text).ok().and_then(|req| req.resolve()) {
                        Some(intent) => {
                            // State changes arrive through the broadcast channel
                            if let Err(e) = state.engine.on_intent(&entry_id, intent).await {
                                debug!(entry_id = %entry_id, error = %e, "intent for closed entry");
                                break;
                            }
                        }
                        None => debug!(entry_id = %entry_id, "ignored malformed presenter message"),
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!(entry_id = %entry_id, "presenter disconnected");
}

async fn send_state<S>(sender: &mut S, alert: &AlertState) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(alert).unwrap_or_default();
    sender.send(Message::Text(json)).await
}

/// Generate entry ID
fn generate_entry_id(counter: &AtomicU64) -> String {
    let seq = counter.fetch_add(1, Ordering::SeqCst);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("entry_{:x}_{}", nanos as u64, seq)
}

/// Run the API server
pub async fn run_server(addr: &str, config: EngineConfig) -> anyhow::Result<()> {
    if config.audit_log_path.is_none() {
        warn!(
            capacity = config.audit_memory_capacity,
            "no audit_log_path set; audit rows are kept in memory only"
        );
    }
    let router = create_router(config)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "crisiswatch API listening");
    println!("🛟 crisiswatch API running on {}", addr);
    println!("  POST   /scan                 - Stateless scan");
    println!("  POST   /entry/new            - Open entry");
    println!("  GET    /entry/:id            - Alert state");
    println!("  POST   /entry/:id/revision   - Submit text revision");
    println!("  POST   /entry/:id/intent     - User intent / UI action");
    println!("  POST   /entry/:id/presented  - Banner shown");
    println!("  DELETE /entry/:id            - Archive entry");
    println!("  GET    /entry/:id/audit      - Audit rows");
    println!("  WS     /ws/:id               - Live alert state");
    println!("  GET    /health               - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}
