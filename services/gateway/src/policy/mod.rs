use std::fmt;

use anyhow::Error as AnyhowError;
use serde::Serialize;
use thiserror::Error;

mod engine;
mod loader;
mod manager;

pub use engine::PolicyRule;
pub use loader::{collect_policy_sources, PolicySource};
pub use manager::PolicyEngine;

pub const DEFAULT_ENTRYPOINT_TEMPLATE: &str = "data.{policy}.allow";
pub const MAX_POLICY_NAME_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy name '{0}'")]
    InvalidName(String),
    #[error("failed to compile policy '{policy}'")]
    CompileFailed {
        policy: String,
        #[source]
        source: AnyhowError,
    },
    #[error("policy '{policy}' does not expose a boolean entrypoint: {reason}")]
    MissingEntrypoint { policy: String, reason: String },
    #[error("failed to read policy sources")]
    SourceLoadError(#[source] AnyhowError),
}

/// Why a policy evaluation did not produce a definitive `true`/`false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PolicyFault {
    NotFound,
    Evaluation(String),
    Undefined,
    NotBoolean(String),
}

impl fmt::Display for PolicyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyFault::NotFound => f.write_str("policy not found"),
            PolicyFault::Evaluation(detail) => write!(f, "policy evaluation error: {detail}"),
            PolicyFault::Undefined => f.write_str("no policy result found"),
            PolicyFault::NotBoolean(kind) => write!(f, "policy result is not a boolean ({kind})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyOutcome {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PolicyFault>,
}

impl PolicyOutcome {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            denied_by: None,
            error: None,
        }
    }

    pub fn deny(policy: impl Into<String>) -> Self {
        Self {
            allowed: false,
            denied_by: Some(policy.into()),
            error: None,
        }
    }

    pub fn fault(policy: impl Into<String>, fault: PolicyFault) -> Self {
        Self {
            allowed: false,
            denied_by: Some(policy.into()),
            error: Some(fault),
        }
    }
}

/// Policy names double as Rego package names, so they are restricted to one
/// identifier segment.
pub fn validate_policy_name(name: &str) -> Result<(), PolicyError> {
    if name.is_empty() || name.len() > MAX_POLICY_NAME_LEN {
        return Err(PolicyError::InvalidName(name.to_string()));
    }

    let starts_with_digit = name.chars().next().is_some_and(|ch| ch.is_ascii_digit());
    if starts_with_digit || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(PolicyError::InvalidName(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_package_style_names() {
        assert!(validate_policy_name("traffic_policy").is_ok());
        assert!(validate_policy_name("v2_rules").is_ok());
    }

    #[test]
    fn rejects_names_that_cannot_be_packages() {
        let too_long = "x".repeat(65);
        for name in ["", "traffic-policy", "a.b", "9lives", too_long.as_str()] {
            assert!(
                matches!(validate_policy_name(name), Err(PolicyError::InvalidName(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn fault_messages_are_short() {
        assert_eq!(PolicyFault::NotFound.to_string(), "policy not found");
        assert_eq!(
            PolicyFault::NotBoolean("string".into()).to_string(),
            "policy result is not a boolean (string)"
        );
    }
}
