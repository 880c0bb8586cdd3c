// promql-service-rs/src/lib.rs
// PromQL Query Generator API - HTTP boundary.
//
// Routes:
// - POST /api/promql/generate-promql     natural language -> generated spec text
// - POST /api/promql/execute-promql      natural language -> executed query + stored conversation
// - POST /api/promql/explain-promql      PromQL -> plain-language explanation
// - GET  /api/promql/conversation/:id    stored conversation lookup
// - GET  /health                         service + store liveness
//
// Status selection happens here and only here: the pipeline reports typed
// failures and this layer translates them once.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

pub mod chart_config;
pub mod conversation_store;
pub mod llm_client;
pub mod pipeline;
pub mod prometheus_client;
pub mod prompts;
pub mod spec_validation;


use pipeline::{PipelineError, QueryPipeline};

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;
const DEFAULT_MAX_INFLIGHT: usize = 32;

/// Natural-language request body (JSON)
#[derive(Debug, Deserialize)]
pub struct PromqlRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub query_prompt: String,
    pub explanation: String,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub conversation_id: String,
    pub generated_payload: Value,
    pub chart_config: Value,
    pub prometheus_data: Value,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service_name: String,
    pub uptime_seconds: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// Core service state and HTTP handlers.
pub struct PromqlService {
    pipeline: Arc<QueryPipeline>,
    inflight: Arc<Semaphore>,
}

impl PromqlService {
    pub fn new(pipeline: QueryPipeline) -> Self {
        let permits = config_rs::env_parse("MAX_INFLIGHT_PIPELINES", DEFAULT_MAX_INFLIGHT);
        Self {
            pipeline: Arc::new(pipeline),
            inflight: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Create the Axum router with all routes and middleware
    pub fn create_router(self: Arc<Self>) -> Router {
        let _ = *START_TIME;
        Router::new()
            .route("/", get(Self::root_handler))
            .route("/health", get(Self::health_handler))
            .route("/api/promql/generate-promql", post(Self::generate_handler))
            .route("/api/promql/execute-promql", post(Self::execute_handler))
            .route("/api/promql/explain-promql", post(Self::explain_handler))
            .route(
                "/api/promql/conversation/:id",
                get(Self::conversation_handler),
            )
            .layer(RequestBodyLimitLayer::new(MAX_PAYLOAD_SIZE))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self)
    }

    async fn root_handler() -> impl IntoResponse {
        Json(serde_json::json!({
            "service": "PromQL Query Generator API",
            "version": "0.1.0",
            "endpoints": [
                "GET /health",
                "POST /api/promql/generate-promql",
                "POST /api/promql/execute-promql",
                "POST /api/promql/explain-promql",
                "GET /api/promql/conversation/:id"
            ]
        }))
    }

    async fn health_handler(State(state): State<Arc<Self>>) -> impl IntoResponse {
        let uptime = START_TIME.elapsed().as_secs() as i64;
        let store_healthy = state.pipeline.store_healthy().await;

        let status = if store_healthy { "SERVING" } else { "DEGRADED" };

        Json(HealthResponse {
            healthy: store_healthy,
            service_name: "promql-service".to_string(),
            uptime_seconds: uptime,
            status: status.to_string(),
        })
    }

    /// POST /api/promql/generate-promql - generate a PromQL query spec from
    /// natural language. No identifier, no storage.
    async fn generate_handler(
        State(state): State<Arc<Self>>,
        Json(request): Json<PromqlRequest>,
    ) -> impl IntoResponse {
        let natural_language = request.query.trim();
        if natural_language.is_empty() {
            return empty_query_response();
        }

        tracing::info!("generate request: {}", natural_language);

        match state.pipeline.generate(natural_language).await {
            Ok(generated) => (
                StatusCode::OK,
                Json(GenerateResponse {
                    query_prompt: generated.query_prompt,
                    explanation: generated.explanation,
                }),
            )
                .into_response(),
            Err(err) => error_response(err),
        }
    }

    /// POST /api/promql/execute-promql - the full pipeline: generate,
    /// validate, execute, store.
    async fn execute_handler(
        State(state): State<Arc<Self>>,
        Json(request): Json<PromqlRequest>,
    ) -> impl IntoResponse {
        let natural_language = request.query.trim().to_string();
        if natural_language.is_empty() {
            return empty_query_response();
        }

        tracing::info!("execute request: {}", natural_language);

        let permit = match state.inflight.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Semaphore closed only on shutdown.
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse {
                        error: "service is shutting down".to_string(),
                        code: 503,
                        details: Value::Null,
                    }),
                )
                    .into_response();
            }
        };

        // Detached task: a client disconnect must not cancel the pipeline;
        // the interaction record is stored either way.
        let pipeline = state.pipeline.clone();
        let outcome = tokio::spawn(async move {
            let _permit = permit;
            pipeline.execute(&natural_language).await
        })
        .await;

        match outcome {
            Ok(Ok(result)) => (
                StatusCode::OK,
                Json(ExecuteResponse {
                    conversation_id: result.conversation_id,
                    generated_payload: result.generated_payload,
                    chart_config: result.chart_config,
                    prometheus_data: result.prometheus_data,
                    success: true,
                    message: result.message,
                }),
            )
                .into_response(),
            Ok(Err(err)) => error_response(err),
            Err(join_err) => {
                tracing::error!("pipeline task failed: {}", join_err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "internal error".to_string(),
                        code: 500,
                        details: Value::Null,
                    }),
                )
                    .into_response()
            }
        }
    }

    /// POST /api/promql/explain-promql - explain a PromQL query in plain
    /// language.
    async fn explain_handler(
        State(state): State<Arc<Self>>,
        Json(request): Json<PromqlRequest>,
    ) -> impl IntoResponse {
        let promql = request.query.trim();
        if promql.is_empty() {
            return empty_query_response();
        }

        match state.pipeline.explain(promql).await {
            Ok(explanation) => (StatusCode::OK, Json(ExplainResponse { explanation })).into_response(),
            Err(err) => error_response(err),
        }
    }

    /// GET /api/promql/conversation/:id - stored conversation lookup.
    async fn conversation_handler(
        State(state): State<Arc<Self>>,
        Path(id): Path<String>,
    ) -> impl IntoResponse {
        let id = id.trim();
        if id.is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "conversation id must not be empty".to_string(),
                    code: 400,
                    details: Value::Null,
                }),
            )
                .into_response();
        }

        match state.pipeline.get_conversation(id).await {
            Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("conversation {} not found", id),
                    code: 404,
                    details: Value::Null,
                }),
            )
                .into_response(),
            Err(err) => error_response(err),
        }
    }
}

fn empty_query_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "query must not be empty".to_string(),
            code: 400,
            details: Value::Null,
        }),
    )
        .into_response()
}

/// The one place pipeline failures become HTTP responses.
fn error_response(err: PipelineError) -> Response {
    let code = err.status_code();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        tracing::error!("pipeline failure: {}", err);
    } else {
        tracing::warn!("pipeline rejection: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code,
            details: err.details(),
        }),
    )
        .into_response()
}
