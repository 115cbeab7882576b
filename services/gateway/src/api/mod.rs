use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

mod handlers;
mod types;

pub use handlers::{
    dispatch, health_check, map_pipeline_error, service_info, AppState, SERVICE_NAME,
};
pub use types::{ErrorResponse, HealthResponse, InfoResponse};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// `/health` and `/info` are served directly; everything else is a pipeline request.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(service_info))
        .fallback(dispatch)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(set_request_id))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Keeps a caller-supplied request id, otherwise assigns a fresh one, and echoes
/// it on the response.
async fn set_request_id(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    if let Some(value) = &request_id {
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value.clone());
    }

    let mut response = next.run(request).await;

    if let Some(value) = request_id {
        response
            .headers_mut()
            .entry(REQUEST_ID_HEADER.clone())
            .or_insert(value);
    }

    response
}
