//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/submit` | Multipart upload (`baseDoc`, `updatedDoc`?, `testsTable`); starts processing |
//! | `POST` | `/process` | `{ "jobId" }`; drives the job and returns its status |
//! | `GET`  | `/status?jobId=` | Current job status |
//! | `GET`  | `/result?jobId=` | Analysis result; consumes the job |
//! | `GET`  | `/search?query=&jobId=&jobIds=` | Ranked test-case rows |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "search query is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `malformed_input` (422), `upstream_format` (502), `upstream_unavailable`
//! (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use reqtrace_core::error::PipelineError;
use reqtrace_core::models::{AnalysisResult, FileNames, JobFiles, SearchableItem, Status};
use reqtrace_core::search::SearchScope;

use crate::app::Services;
use crate::config::Config;

/// Upload size limit for `POST /submit`.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    run_server_with_services(&config.server.bind, services).await
}

/// Starts the server with pre-built services (custom store or LLM).
pub async fn run_server_with_services(bind_addr: &str, services: Services) -> anyhow::Result<()> {
    let app = router(services);

    tracing::info!("reqtrace server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/submit", post(handle_submit))
        .route("/process", post(handle_process))
        .route("/status", get(handle_status))
        .route("/result", get(handle_result))
        .route("/search", get(handle_search))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(services)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            PipelineError::MalformedInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::UpstreamFormat(_) => StatusCode::BAD_GATEWAY,
            PipelineError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Serialization(_) | PipelineError::Internal(_) => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct JobQuery {
    #[serde(rename = "jobId")]
    job_id: Option<String>,
}

impl JobQuery {
    fn require(self) -> Result<String, AppError> {
        self.job_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| bad_request("jobId is required"))
    }
}

// ============ POST /submit ============

#[derive(Serialize)]
struct SubmitResponse {
    #[serde(rename = "jobId")]
    job_id: String,
}

struct Upload {
    name: String,
    data: String,
}

/// Handler for `POST /submit`.
///
/// Accepts `baseDoc`, optional `updatedDoc` and `testsTable` multipart
/// fields, stores them base64-encoded, and starts processing in the
/// background. Poll `/status` for progress.
async fn handle_submit(
    State(services): State<Services>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, AppError> {
    let mut base = None;
    let mut updated = None;
    let mut tests = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(field_name.as_str())
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read {}: {}", field_name, e)))?;
        if bytes.is_empty() {
            continue;
        }
        let upload = Upload {
            name: file_name,
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        };
        match field_name.as_str() {
            "baseDoc" => base = Some(upload),
            "updatedDoc" => updated = Some(upload),
            "testsTable" => tests = Some(upload),
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let base = base.ok_or_else(|| bad_request("baseDoc is required"))?;
    let tests = tests.ok_or_else(|| bad_request("testsTable is required"))?;

    let names = FileNames {
        base_name: base.name,
        updated_name: updated.as_ref().map(|u| u.name.clone()),
        tests_name: tests.name,
    };
    let files = JobFiles {
        base: base.data,
        updated: updated.map(|u| u.data),
        tests: tests.data,
    };

    let job_id = services.orchestrator.submit(files, names).await?;

    let orchestrator = services.orchestrator.clone();
    let background_id = job_id.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.advance(&background_id).await {
            tracing::error!(job_id = %background_id, error = %e, "background processing failed");
        }
    });

    Ok(Json(SubmitResponse { job_id }))
}

// ============ POST /process ============

#[derive(Deserialize)]
struct ProcessRequest {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Serialize)]
struct ProcessResponse {
    success: bool,
    status: Status,
}

/// Handler for `POST /process`.
///
/// Drives the job to a terminal phase (or reports its current phase if it
/// is already running or done).
async fn handle_process(
    State(services): State<Services>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, AppError> {
    if req.job_id.trim().is_empty() {
        return Err(bad_request("jobId is required"));
    }
    let status = services.orchestrator.advance(&req.job_id).await?;
    Ok(Json(ProcessResponse {
        success: true,
        status,
    }))
}

// ============ GET /status, GET /result ============

async fn handle_status(
    State(services): State<Services>,
    Query(query): Query<JobQuery>,
) -> Result<Json<Status>, AppError> {
    let job_id = query.require()?;
    Ok(Json(services.orchestrator.status(&job_id).await?))
}

/// Handler for `GET /result`. The job's files, status and result are
/// deleted once returned; its searchable rows remain.
async fn handle_result(
    State(services): State<Services>,
    Query(query): Query<JobQuery>,
) -> Result<Json<AnalysisResult>, AppError> {
    let job_id = query.require()?;
    Ok(Json(services.orchestrator.take_result(&job_id).await?))
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchQuery {
    query: Option<String>,
    #[serde(rename = "jobId")]
    job_id: Option<String>,
    #[serde(rename = "jobIds")]
    job_ids: Option<String>,
}

async fn handle_search(
    State(services): State<Services>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<SearchableItem>>, AppError> {
    let scope = SearchScope::from_params(params.job_id.as_deref(), params.job_ids.as_deref());
    let query = params.query.unwrap_or_default();
    Ok(Json(services.search.search(&scope, &query).await?))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
