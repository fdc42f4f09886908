use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jsbox::{Capabilities, EvalRequest, EvalService, ResourceLimits};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Evaluation error: {0}")]
    Eval(#[from] jsbox::Error),
    #[error("Server error: {0}")]
    Server(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Eval(jsbox::Error::Engine(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ServerError::Eval(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ServerError::Server(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EvalHttpRequest {
    pub code: String,
    pub input: Option<String>,
    pub globals: Option<HashMap<String, serde_json::Value>>,
    pub capabilities: Option<Capabilities>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvalHttpResponse {
    pub status: String,
    pub output: String,
    pub value: Option<String>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub max_rss: u64,
}

#[derive(Clone)]
pub struct AppState {
    service: Arc<EvalService>,
}

pub async fn create_app(
    max_concurrent_evals: usize,
    resource_limits: ResourceLimits,
) -> Result<Router, ServerError> {
    let service = EvalService::new(max_concurrent_evals, resource_limits)
        .await
        .map_err(ServerError::Eval)?;

    let state = AppState {
        service: Arc::new(service),
    };

    let cors = CorsLayer::permissive();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/eval", post(eval))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(app)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), ServerError> {
    info!("Starting evaluation server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Server(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Server(e.to_string()))?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn eval(
    State(state): State<AppState>,
    Json(payload): Json<EvalHttpRequest>,
) -> Result<Json<EvalHttpResponse>, ServerError> {
    let request = EvalRequest {
        code: payload.code,
        input: payload.input,
        globals: payload.globals.unwrap_or_default(),
        capabilities: payload.capabilities,
        timeout: Duration::from_secs(payload.timeout.unwrap_or(30)),
    };

    let report = state.service.evaluate(request).await?;

    Ok(Json(EvalHttpResponse {
        status: report.status.to_string(),
        output: report.output,
        value: report.value,
        error: report.error,
        execution_time_ms: report.stats.execution_time.as_millis() as u64,
        max_rss: report.stats.max_rss,
    }))
}
