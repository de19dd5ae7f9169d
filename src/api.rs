//! REST API server for the investment dashboard
//!
//! Exposes the form inputs, figures, photo analysis, report download and
//! chat assistant over HTTP for a thin front end.

use std::convert::Infallible;
use std::ops::ControlFlow;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TaxParameters;
use crate::error::DashboardError;
use crate::financial::{chart_series, compute_financials, dashboard_metrics};
use crate::llm::LanguageModel;
use crate::models::{
    ChatTurn, DashboardCharts, DashboardMetrics, FinancialResult, ImageAttachment, ImageUpload,
    NarrativeReport, PropertyInputs,
};
use crate::report::assemble_report;
use crate::session::SessionStore;
use crate::shopping::analyze_photos;
use crate::Result;

/// Photos arrive base64-encoded in JSON
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct FinancialsRequest {
    #[serde(default)]
    pub inputs: PropertyInputs,
    pub tax: Option<TaxParameters>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    pub photos: Vec<ImageUpload>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// =============================
/// Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub code: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            code: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(err: &DashboardError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Everything the strategy tab displays
#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub inputs: PropertyInputs,
    pub result: FinancialResult,
    pub metrics: DashboardMetrics,
    pub charts: DashboardCharts,
}

fn dashboard_view(inputs: &PropertyInputs, tax: &TaxParameters) -> Result<DashboardView> {
    let result = compute_financials(inputs, tax)?;
    Ok(DashboardView {
        inputs: inputs.clone(),
        metrics: dashboard_metrics(&result),
        charts: chart_series(inputs, &result),
        result,
    })
}

fn respond<T: Serialize>(result: Result<T>) -> (StatusCode, Json<ApiResponse>) {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => failure(e),
    }
}

fn failure(err: DashboardError) -> (StatusCode, Json<ApiResponse>) {
    let status = err.status_code();
    if status.is_server_error() {
        warn!("Request failed: {}", err);
    }
    (status, Json(ApiResponse::error(&err)))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionStore>,
    /// `None` when no API key was configured
    pub model: Option<Arc<dyn LanguageModel>>,
    pub tax: TaxParameters,
}

impl ApiState {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, tax: TaxParameters) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new()),
            model,
            tax,
        }
    }

    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Arc::new(sessions);
        self
    }

    fn model(&self) -> Result<Arc<dyn LanguageModel>> {
        self.model.clone().ok_or(DashboardError::MissingApiKey)
    }
}

/// =============================
/// Health & Stateless Endpoints
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "ai_enabled": state.model.is_some(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn compute_handler(
    State(state): State<ApiState>,
    Json(req): Json<FinancialsRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let tax = req.tax.unwrap_or(state.tax);
    respond(dashboard_view(&req.inputs, &tax))
}

/// =============================
/// Session & Form Endpoints
/// =============================

async fn create_session(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let handle = state.sessions.create().await;
    let inputs = handle.context.read().await.inputs.clone();

    match dashboard_view(&inputs, &state.tax) {
        Ok(view) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": handle.id,
                "dashboard": view,
            }))),
        ),
        Err(e) => failure(e),
    }
}

async fn delete_session(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    respond(
        state
            .sessions
            .remove(id)
            .await
            .map(|_| serde_json::json!({ "session_id": id })),
    )
}

async fn get_property(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    let result = async {
        let handle = state.sessions.get(id).await?;
        let inputs = handle.context.read().await.inputs.clone();
        Ok::<PropertyInputs, DashboardError>(inputs)
    }
    .await;
    respond(result)
}

async fn put_property(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(inputs): Json<PropertyInputs>,
) -> (StatusCode, Json<ApiResponse>) {
    let result = async {
        let handle = state.sessions.get(id).await?;
        // Only valid inputs replace the current form
        let view = dashboard_view(&inputs, &state.tax)?;
        handle.context.write().await.inputs = inputs;
        Ok::<DashboardView, DashboardError>(view)
    }
    .await;
    respond(result)
}

async fn get_dashboard(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    let result = async {
        let handle = state.sessions.get(id).await?;
        let inputs = handle.context.read().await.inputs.clone();
        dashboard_view(&inputs, &state.tax)
    }
    .await;
    respond(result)
}

async fn put_logo(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(upload): Json<ImageUpload>,
) -> (StatusCode, Json<ApiResponse>) {
    let result = async {
        let handle = state.sessions.get(id).await?;
        let logo = ImageAttachment::from_upload(&upload)?;
        let summary = serde_json::json!({
            "file_name": logo.file_name,
            "media_type": logo.media_type,
            "bytes": logo.data.len(),
        });
        handle.context.write().await.logo = Some(logo);
        Ok::<serde_json::Value, DashboardError>(summary)
    }
    .await;
    respond(result)
}

async fn delete_logo(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    let result = async {
        let handle = state.sessions.get(id).await?;
        let removed = handle.context.write().await.logo.take().is_some();
        Ok::<serde_json::Value, DashboardError>(serde_json::json!({ "removed": removed }))
    }
    .await;
    respond(result)
}

/// =============================
/// Analysis & Report Endpoints
/// =============================

async fn run_analysis(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnalysisRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let result = async {
        let handle = state.sessions.get(id).await?;
        let model = state.model()?;
        let photos = req
            .photos
            .iter()
            .map(ImageAttachment::from_upload)
            .collect::<Result<Vec<_>>>()?;
        let inputs = handle.context.read().await.inputs.clone();

        let narrative = analyze_photos(model.as_ref(), &inputs, &photos).await?;
        handle.context.write().await.narrative = Some(narrative.clone());
        Ok::<NarrativeReport, DashboardError>(narrative)
    }
    .await;
    respond(result)
}

async fn download_report(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    let result = async {
        let handle = state.sessions.get(id).await?;
        let context = handle.context.read().await;
        let figures = compute_financials(&context.inputs, &state.tax)?;
        assemble_report(
            &context.inputs,
            &figures,
            context.narrative.as_ref(),
            context.logo.as_ref(),
        )
    }
    .await;

    match result {
        Ok(report) => {
            info!(session_id = %id, "Serving report download");
            (
                [
                    (
                        header::CONTENT_TYPE,
                        format!("{}; charset=utf-8", report.mime_type),
                    ),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", report.file_name),
                    ),
                ],
                report.html,
            )
                .into_response()
        }
        Err(e) => failure(e).into_response(),
    }
}

/// =============================
/// Chat Endpoints
/// =============================

async fn get_transcript(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    let result = async {
        let handle = state.sessions.get(id).await?;
        let chat = handle.chat.lock().await;
        Ok::<Vec<ChatTurn>, DashboardError>(chat.turns().to_vec())
    }
    .await;
    respond(result)
}

/// Streams `delta` events, then one `done` (committed assistant turn) or
/// `error` event.
async fn chat_stream(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        return failure(DashboardError::invalid_input("chat message cannot be empty"))
            .into_response();
    }

    let handle = match state.sessions.get(id).await {
        Ok(handle) => handle,
        Err(e) => return failure(e).into_response(),
    };
    let model = match state.model() {
        Ok(model) => model,
        Err(e) => return failure(e).into_response(),
    };

    // Queue behind earlier turns of this session before anything is sent
    let mut chat = handle.chat.clone().lock_owned().await;
    let inputs = handle.context.read().await.inputs.clone();

    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
        let delta_tx = tx.clone();
        let turn = chat.send(model.as_ref(), &inputs, &req.message, |delta| {
            let event = Event::default()
                .event("delta")
                .json_data(serde_json::json!({ "delta": delta }));
            match event.map(|event| delta_tx.send(event).is_ok()) {
                Ok(true) => ControlFlow::Continue(()),
                _ => ControlFlow::Break(()),
            }
        });

        // A client gone while the model is silent must still release the chat lock
        let outcome = tokio::select! {
            outcome = turn => outcome,
            _ = tx.closed() => {
                warn!(session_id = %id, "Chat client disconnected, turn abandoned");
                return;
            }
        };

        let last = match outcome {
            Ok(turn) => Event::default().event("done").json_data(turn),
            Err(e) => {
                warn!(session_id = %id, "Chat turn failed: {}", e);
                Event::default().event("error").json_data(serde_json::json!({
                    "error": e.to_string(),
                    "code": e.code(),
                }))
            }
        };

        if let Ok(event) = last {
            let _ = tx.send(event);
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/financials", post(compute_handler))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", delete(delete_session))
        .route(
            "/api/sessions/:id/property",
            get(get_property).put(put_property),
        )
        .route("/api/sessions/:id/dashboard", get(get_dashboard))
        .route("/api/sessions/:id/logo", put(put_logo).delete(delete_logo))
        .route("/api/sessions/:id/analysis", post(run_analysis))
        .route("/api/sessions/:id/report", get(download_report))
        .route(
            "/api/sessions/:id/chat",
            get(get_transcript).post(chat_stream),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let _sweeper = state.sessions.spawn_sweeper();
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
