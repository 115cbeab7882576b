use std::{fmt, sync::Arc, time::Instant};

use tracing::{debug, info, instrument, warn};

use super::{PipelineError, PipelineInput, PipelineOptions, PipelineResponse, Stage};
use crate::{
    mock::ResponseProducer,
    policy::{PolicyEngine, PolicyFault, PolicyOutcome},
    routes::{RouteDefinition, RouteRegistry},
};

/// Per-request decision procedure over a loaded registry and policy set.
///
/// Everything held here is read-only once constructed; a single `Pipeline`
/// behind an `Arc` serves all concurrent requests.
pub struct Pipeline {
    registry: Arc<RouteRegistry>,
    policies: Arc<PolicyEngine>,
    producer: Box<dyn ResponseProducer>,
    options: PipelineOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("routes", &self.registry.len())
            .field("policies", &self.policies.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        registry: Arc<RouteRegistry>,
        policies: Arc<PolicyEngine>,
        producer: impl ResponseProducer + 'static,
    ) -> Self {
        Self {
            registry,
            policies,
            producer: Box::new(producer),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn policies(&self) -> &PolicyEngine {
        &self.policies
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn process(&self, input: &PipelineInput) -> Result<PipelineResponse, PipelineError> {
        self.process_until(input, None)
    }

    /// Runs every stage in order. When `deadline` is set it is checked before
    /// each stage after route lookup.
    #[instrument(
        skip(self, input, deadline),
        fields(method = %input.method, path = %input.path)
    )]
    pub fn process_until(
        &self,
        input: &PipelineInput,
        deadline: Option<Instant>,
    ) -> Result<PipelineResponse, PipelineError> {
        let route = self.lookup(input)?;

        check_deadline(deadline, Stage::RequestValidation)?;
        self.validate_request(route, input)?;

        check_deadline(deadline, Stage::PolicyEvaluation)?;
        self.authorize(route, input)?;

        check_deadline(deadline, Stage::ResponseProduction)?;
        let body = self
            .producer
            .produce(route, input)
            .map_err(|err| PipelineError::InternalError {
                stage: Stage::ResponseProduction,
                diagnostic: err.to_string(),
            })?;

        check_deadline(deadline, Stage::ResponseValidation)?;
        let response_violations = self.validate_response(route, &body)?;

        debug!(route = %route.endpoint(), "request completed");
        Ok(PipelineResponse {
            route: route.name.clone(),
            body,
            response_violations,
        })
    }

    fn lookup(&self, input: &PipelineInput) -> Result<&RouteDefinition, PipelineError> {
        if let Some(route) = self.registry.resolve(&input.method, &input.path) {
            return Ok(route);
        }

        let allowed = self.registry.methods_for(&input.path);
        if allowed.is_empty() {
            Err(PipelineError::RouteNotFound {
                method: input.method.clone(),
                path: input.path.clone(),
            })
        } else {
            Err(PipelineError::MethodNotSupported {
                path: input.path.clone(),
                allowed,
            })
        }
    }

    fn validate_request(
        &self,
        route: &RouteDefinition,
        input: &PipelineInput,
    ) -> Result<(), PipelineError> {
        if route.request_schema.is_unconstrained() {
            return Ok(());
        }

        let outcome = route.request_schema.validate(input.body_or_null());
        if outcome.valid {
            return Ok(());
        }

        info!(
            route = %route.endpoint(),
            errors = ?outcome.errors,
            "request rejected by schema"
        );
        Err(PipelineError::RequestSchemaViolation {
            errors: outcome.errors,
        })
    }

    fn authorize(&self, route: &RouteDefinition, input: &PipelineInput) -> Result<(), PipelineError> {
        if route.policy_names.is_empty() {
            return Ok(());
        }

        let outcome = self
            .policies
            .evaluate_all(&route.policy_names, &input.policy_input());
        if outcome.allowed {
            return Ok(());
        }

        info!(
            route = %route.endpoint(),
            denied_by = outcome.denied_by.as_deref().unwrap_or_default(),
            "request denied by policy"
        );
        Err(denial(outcome))
    }

    fn validate_response(
        &self,
        route: &RouteDefinition,
        body: &serde_json::Value,
    ) -> Result<Vec<String>, PipelineError> {
        if route.response_schema.is_unconstrained() {
            return Ok(Vec::new());
        }

        let outcome = route.response_schema.validate(body);
        if outcome.valid {
            return Ok(Vec::new());
        }

        warn!(
            route = %route.endpoint(),
            errors = ?outcome.errors,
            "response does not match its schema"
        );

        if self.options.enforce_response_schema {
            return Err(PipelineError::InternalError {
                stage: Stage::ResponseValidation,
                diagnostic: format!(
                    "response schema violation: {}",
                    crate::schema::format_validation_errors(&outcome.errors)
                ),
            });
        }

        Ok(outcome.errors)
    }
}

fn check_deadline(deadline: Option<Instant>, next: Stage) -> Result<(), PipelineError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            warn!(stage = %next, "request deadline exceeded");
            Err(PipelineError::DeadlineExceeded { stage: next })
        }
        _ => Ok(()),
    }
}

/// A missing policy is a plain denial; every other fault is an evaluation error.
fn denial(outcome: PolicyOutcome) -> PipelineError {
    let policy = outcome.denied_by.unwrap_or_default();
    match outcome.error {
        None => PipelineError::PolicyDenied {
            denied_by: policy,
            reason: None,
        },
        Some(PolicyFault::NotFound) => PipelineError::PolicyDenied {
            denied_by: policy,
            reason: Some(PolicyFault::NotFound.to_string()),
        },
        Some(fault) => PipelineError::PolicyEvaluationError {
            policy,
            diagnostic: fault.to_string(),
        },
    }
}
