use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::routes::RouteMethod;

mod input;
mod orchestrator;

pub use input::PipelineInput;
pub use orchestrator::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RouteLookup,
    RequestValidation,
    PolicyEvaluation,
    ResponseProduction,
    ResponseValidation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::RouteLookup => "route_lookup",
            Stage::RequestValidation => "request_validation",
            Stage::PolicyEvaluation => "policy_evaluation",
            Stage::ResponseProduction => "response_production",
            Stage::ResponseValidation => "response_validation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a request that did not produce a response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },
    #[error("method not allowed for {path}")]
    MethodNotSupported {
        path: String,
        allowed: Vec<RouteMethod>,
    },
    #[error("request validation failed")]
    RequestSchemaViolation { errors: Vec<String> },
    #[error("access denied by policy '{denied_by}'")]
    PolicyDenied {
        denied_by: String,
        reason: Option<String>,
    },
    #[error("policy '{policy}' could not be evaluated: {diagnostic}")]
    PolicyEvaluationError { policy: String, diagnostic: String },
    #[error("internal error during {stage}: {diagnostic}")]
    InternalError { stage: Stage, diagnostic: String },
    #[error("request deadline exceeded before {stage}")]
    DeadlineExceeded { stage: Stage },
}

impl PipelineError {
    /// The stage that ended the request.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::RouteNotFound { .. } | PipelineError::MethodNotSupported { .. } => {
                Stage::RouteLookup
            }
            PipelineError::RequestSchemaViolation { .. } => Stage::RequestValidation,
            PipelineError::PolicyDenied { .. } | PipelineError::PolicyEvaluationError { .. } => {
                Stage::PolicyEvaluation
            }
            PipelineError::InternalError { stage, .. }
            | PipelineError::DeadlineExceeded { stage } => *stage,
        }
    }
}

/// A produced response plus any advisory response-schema findings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResponse {
    pub route: String,
    pub body: JsonValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_violations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineOptions {
    /// Turn a response schema violation into `InternalError` instead of logging it.
    pub enforce_response_schema: bool,
}
