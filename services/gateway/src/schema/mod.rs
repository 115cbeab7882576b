use serde::Serialize;
use thiserror::Error;

mod validator;

pub use validator::{
    format_validation_errors, json_type_name, validate, SchemaDoc,
};

/// Result of checking one value against one schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("schema does not compile: {0}")]
    Compile(String),
}
