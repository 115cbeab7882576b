use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tokio::{task::spawn_blocking, time::timeout};
use tracing::{error, info, instrument, warn};

use crate::{
    pipeline::{Pipeline, PipelineError, PipelineInput},
    schema::format_validation_errors,
};

use super::types::{ErrorResponse, HealthResponse, InfoResponse};

pub const SERVICE_NAME: &str = "control-plane-gateway";

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, request_timeout: Duration) -> Self {
        Self {
            pipeline,
            request_timeout,
        }
    }
}

#[instrument(skip_all)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

#[instrument(skip_all)]
pub async fn service_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let registry = state.pipeline.registry();
    Json(InfoResponse {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        route_count: registry.len(),
        policies: state.pipeline.policies().policy_names(),
        endpoints: registry.list().iter().map(|route| route.endpoint()).collect(),
        enforce_response_schema: state.pipeline.options().enforce_response_schema,
    })
}

/// Fallback handler: every request that is not an operational endpoint goes
/// through the pipeline.
#[instrument(skip_all, fields(method = %method, path = %uri.path()))]
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let input = match build_input(&method, &uri, &headers, &body) {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    let started = Instant::now();
    let deadline = started + state.request_timeout;
    let pipeline = Arc::clone(&state.pipeline);

    let result = match timeout(
        state.request_timeout,
        spawn_blocking(move || pipeline.process_until(&input, Some(deadline))),
    )
    .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            error!(error = ?join_err, "pipeline task failed");
            return internal_error().into_response();
        }
        Err(_) => {
            warn!(
                timeout_ms = state.request_timeout.as_millis() as u64,
                "pipeline did not finish before the request deadline"
            );
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(
                    ErrorResponse::new("request deadline exceeded", "DEADLINE_EXCEEDED")
                        .with_details(json!({
                            "timeoutMs": state.request_timeout.as_millis() as u64
                        })),
                ),
            )
                .into_response();
        }
    };

    match result {
        Ok(response) => {
            info!(
                route = %response.route,
                elapsed_us = started.elapsed().as_micros() as u64,
                "request served"
            );
            (StatusCode::OK, Json(response.body)).into_response()
        }
        Err(err) => map_pipeline_error(err).into_response(),
    }
}

fn build_input(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<PipelineInput, ApiError> {
    let mut input = PipelineInput::new(method.as_str(), uri.path());
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            input = input.with_header(name.as_str(), value);
        }
    }

    if let Some(body) = parse_body(method, body)? {
        input = input.with_body(body);
    }

    Ok(input)
}

/// Empty bodies and GET/HEAD bodies are treated as absent.
fn parse_body(method: &Method, body: &Bytes) -> Result<Option<Value>, ApiError> {
    if *method == Method::GET || *method == Method::HEAD {
        return Ok(None);
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(body).map(Some).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new("request body is not valid JSON", "INVALID_JSON")
                    .with_details(json!({ "reason": err.to_string() })),
            ),
        )
    })
}

pub fn map_pipeline_error(err: PipelineError) -> ApiError {
    let message = err.to_string();
    match err {
        PipelineError::RouteNotFound { method, path } => (
            StatusCode::NOT_FOUND,
            Json(
                ErrorResponse::new(message, "ROUTE_NOT_FOUND")
                    .with_details(json!({ "method": method, "path": path })),
            ),
        ),
        PipelineError::MethodNotSupported { path, allowed } => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(
                ErrorResponse::new(message, "METHOD_NOT_ALLOWED")
                    .with_details(json!({ "path": path, "allowed": allowed })),
            ),
        ),
        PipelineError::RequestSchemaViolation { errors } => {
            let summary = format_validation_errors(&errors);
            (
                StatusCode::BAD_REQUEST,
                Json(
                    ErrorResponse::new(message, "VALIDATION_ERROR")
                        .with_details(json!({ "errors": errors, "summary": summary })),
                ),
            )
        }
        PipelineError::PolicyDenied { denied_by, reason } => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new(message, "POLICY_DENIED").with_details(json!({
                "deniedBy": denied_by,
                "reason": reason,
            }))),
        ),
        PipelineError::PolicyEvaluationError { policy, diagnostic } => {
            error!(policy = %policy, %diagnostic, "policy evaluation failed");
            (
                StatusCode::FORBIDDEN,
                Json(
                    ErrorResponse::new("policy evaluation failed", "POLICY_EVALUATION_ERROR")
                        .with_details(json!({ "deniedBy": policy })),
                ),
            )
        }
        PipelineError::InternalError { stage, diagnostic } => {
            error!(stage = %stage, %diagnostic, "request failed internally");
            internal_error()
        }
        PipelineError::DeadlineExceeded { stage } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(
                ErrorResponse::new(message, "DEADLINE_EXCEEDED")
                    .with_details(json!({ "stage": stage })),
            ),
        ),
    }
}

fn internal_error() -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal server error", "INTERNAL_ERROR")),
    )
}
