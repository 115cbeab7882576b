use anyhow::anyhow;
use regorus::{Engine as RegoEngine, Value as RegoValue};
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use super::{validate_policy_name, PolicyError, PolicyFault, DEFAULT_ENTRYPOINT_TEMPLATE};
use crate::schema::json_type_name;

/// One compiled policy: a Rego module whose package is the policy name,
/// queried at `data.<name>.allow`.
///
/// The compiled engine is never mutated after construction; every evaluation
/// works on its own clone so concurrent callers share nothing but this value.
#[derive(Clone)]
pub struct PolicyRule {
    name: String,
    engine: RegoEngine,
    entrypoint: String,
}

impl PolicyRule {
    pub fn compile(name: &str, source: &str) -> Result<Self, PolicyError> {
        validate_policy_name(name)?;

        let mut engine = RegoEngine::new();
        engine
            .add_policy(format!("{name}.rego"), source.to_string())
            .map_err(|err| PolicyError::CompileFailed {
                policy: name.to_string(),
                source: anyhow!("failed to parse policy source: {}", err),
            })?;

        let rule = Self {
            name: name.to_string(),
            engine,
            entrypoint: DEFAULT_ENTRYPOINT_TEMPLATE.replace("{policy}", name),
        };
        rule.verify_entrypoint()?;

        Ok(rule)
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    /// Runs the policy against `input` and returns its `allow` decision.
    ///
    /// Anything other than a boolean result is a fault, never an implicit allow.
    #[instrument(skip(self, input), fields(policy = %self.name))]
    pub fn evaluate(&self, input: &JsonValue) -> Result<bool, PolicyFault> {
        let mut engine = self.engine.clone();

        let input_json = serde_json::to_string(input)
            .map_err(|err| PolicyFault::Evaluation(format!("unserializable input: {err}")))?;
        engine
            .set_input_json(&input_json)
            .map_err(|err| PolicyFault::Evaluation(err.to_string()))?;

        let result = engine
            .eval_rule(self.entrypoint.clone())
            .map_err(|err| PolicyFault::Evaluation(err.to_string()))?;

        let decision = parse_decision(&result);
        debug!(
            policy = %self.name,
            decision = ?decision,
            "policy evaluation completed"
        );

        decision
    }

    fn verify_entrypoint(&self) -> Result<(), PolicyError> {
        match self.evaluate(&JsonValue::Object(Default::default())) {
            Ok(_) => Ok(()),
            Err(fault) => Err(PolicyError::MissingEntrypoint {
                policy: self.name.clone(),
                reason: fault.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRule")
            .field("name", &self.name)
            .field("entrypoint", &self.entrypoint)
            .finish()
    }
}

fn parse_decision(result: &RegoValue) -> Result<bool, PolicyFault> {
    match result {
        RegoValue::Bool(allow) => Ok(*allow),
        RegoValue::Undefined => Err(PolicyFault::Undefined),
        other => Err(PolicyFault::NotBoolean(rego_kind(other).to_string())),
    }
}

fn rego_kind(value: &RegoValue) -> &'static str {
    serde_json::to_value(value)
        .map(|json| json_type_name(&json))
        .unwrap_or("unknown")
}
