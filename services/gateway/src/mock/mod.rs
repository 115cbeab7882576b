use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::{pipeline::PipelineInput, routes::RouteDefinition};

mod responder;

pub use responder::{MockResponder, StatusResponse, TrafficRequest, TrafficResponse};

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("request path '{0}' does not carry a service id")]
    MissingServiceId(String),
    #[error("request body is not a traffic request: {0}")]
    InvalidTrafficRequest(String),
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Produces the response for a request that passed validation and policy.
///
/// Called from the pipeline's blocking context; implementations must not block
/// on I/O for long.
pub trait ResponseProducer: Send + Sync {
    fn produce(
        &self,
        route: &RouteDefinition,
        input: &PipelineInput,
    ) -> Result<JsonValue, ProducerError>;
}

impl<F> ResponseProducer for F
where
    F: Fn(&RouteDefinition, &PipelineInput) -> Result<JsonValue, ProducerError> + Send + Sync,
{
    fn produce(
        &self,
        route: &RouteDefinition,
        input: &PipelineInput,
    ) -> Result<JsonValue, ProducerError> {
        self(route, input)
    }
}
