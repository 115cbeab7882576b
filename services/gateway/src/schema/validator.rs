use std::{fmt, sync::Arc};

use jsonschema::{Retrieve, Uri, Validator};
use serde_json::Value;
use tracing::trace;

use super::{SchemaError, ValidationOutcome};

const ROOT_PREFIX: &str = "(root): ";

/// A compiled JSON-Schema document, or the distinguished "no constraint" value.
///
/// An absent, `null` or empty-object schema compiles to [`SchemaDoc::Unconstrained`]
/// and every value validates against it without inspection.
#[derive(Clone, Default)]
pub enum SchemaDoc {
    #[default]
    Unconstrained,
    Compiled {
        raw: Arc<Value>,
        validator: Arc<Validator>,
    },
}

impl SchemaDoc {
    pub fn compile(schema: Option<&Value>) -> Result<Self, SchemaError> {
        let schema = match schema {
            None | Some(Value::Null) => return Ok(Self::Unconstrained),
            Some(Value::Object(map)) if map.is_empty() => return Ok(Self::Unconstrained),
            Some(value @ Value::Object(_)) => value,
            Some(other) => return Err(SchemaError::NotAnObject(json_type_name(other))),
        };

        let validator = jsonschema::options()
            .should_validate_formats(true)
            .with_retriever(OfflineRetriever)
            .build(schema)
            .map_err(|err| SchemaError::Compile(err.to_string()))?;

        Ok(Self::Compiled {
            raw: Arc::new(schema.clone()),
            validator: Arc::new(validator),
        })
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Self::Unconstrained)
    }

    pub fn validate(&self, value: &Value) -> ValidationOutcome {
        validate(self, value)
    }
}

impl fmt::Debug for SchemaDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconstrained => f.write_str("SchemaDoc::Unconstrained"),
            Self::Compiled { raw, .. } => f.debug_tuple("SchemaDoc::Compiled").field(raw).finish(),
        }
    }
}

/// Validates `value` against a compiled schema.
///
/// Produces one message per violated constraint, prefixed with the JSON pointer of the
/// offending location (or `(root)`).
pub fn validate(schema: &SchemaDoc, value: &Value) -> ValidationOutcome {
    let validator = match schema {
        SchemaDoc::Unconstrained => return ValidationOutcome::ok(),
        SchemaDoc::Compiled { validator, .. } => validator,
    };

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|err| {
            let location = err.instance_path.to_string();
            if location.is_empty() {
                format!("{ROOT_PREFIX}{err}")
            } else {
                format!("{location}: {err}")
            }
        })
        .collect();

    trace!(violations = errors.len(), "schema validation finished");

    ValidationOutcome::failed(errors)
}

/// Joins violation messages into one line for a terminal error body,
/// dropping the root-location prefix.
pub fn format_validation_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|err| err.strip_prefix(ROOT_PREFIX).unwrap_or(err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Refuses every external `$ref`; route schemas must be self-contained.
struct OfflineRetriever;

impl Retrieve for OfflineRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Err(format!("external schema reference '{}' is not allowed", uri.as_str()).into())
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn traffic_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "trafficType": { "type": "string", "enum": ["incoming", "outgoing", "internal"] },
                "volume": { "type": "number", "minimum": 0 },
                "priority": { "type": "string", "enum": ["low", "medium", "high", "critical"] },
                "metadata": {
                    "type": "object",
                    "properties": { "source": { "type": "string" } }
                }
            },
            "required": ["trafficType", "volume", "priority"]
        })
    }

    #[test]
    fn empty_or_absent_schema_is_always_valid() {
        for schema in [None, Some(json!({})), Some(Value::Null)] {
            let doc = SchemaDoc::compile(schema.as_ref()).unwrap();
            assert!(doc.is_unconstrained());
            assert!(doc.validate(&json!("anything")).valid);
            assert!(doc.validate(&Value::Null).valid);
        }
    }

    #[test]
    fn non_object_schema_is_rejected() {
        let err = SchemaDoc::compile(Some(&json!(["type", "object"]))).unwrap_err();
        assert!(matches!(err, SchemaError::NotAnObject("array")));
    }

    #[test]
    fn valid_traffic_body_passes() {
        let doc = SchemaDoc::compile(Some(&traffic_schema())).unwrap();
        let outcome = doc.validate(&json!({
            "trafficType": "incoming",
            "volume": 100.5,
            "priority": "medium"
        }));
        assert_eq!(outcome, ValidationOutcome::ok());
    }

    #[test]
    fn reports_one_error_per_violated_field() {
        let doc = SchemaDoc::compile(Some(&traffic_schema())).unwrap();
        let outcome = doc.validate(&json!({
            "trafficType": "invalid",
            "volume": -10,
            "priority": "wrong"
        }));

        assert!(!outcome.valid);
        assert_eq!(outcome.errors.len(), 3);
        assert!(outcome.errors.iter().any(|e| e.starts_with("/trafficType")));
        assert!(outcome.errors.iter().any(|e| e.starts_with("/volume")));
        assert!(outcome.errors.iter().any(|e| e.starts_with("/priority")));
    }

    #[test]
    fn missing_required_property_is_reported_at_root() {
        let doc = SchemaDoc::compile(Some(&traffic_schema())).unwrap();
        let outcome = doc.validate(&json!({ "trafficType": "incoming", "volume": 1 }));

        assert!(!outcome.valid);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with(ROOT_PREFIX));
        assert!(outcome.errors[0].contains("priority"));
    }

    #[test]
    fn nested_properties_are_checked() {
        let doc = SchemaDoc::compile(Some(&traffic_schema())).unwrap();
        let outcome = doc.validate(&json!({
            "trafficType": "internal",
            "volume": 0,
            "priority": "low",
            "metadata": { "source": 42 }
        }));

        assert!(!outcome.valid);
        assert!(outcome.errors[0].starts_with("/metadata/source"));
    }

    #[test]
    fn date_time_format_is_checked() {
        let schema = json!({
            "type": "object",
            "properties": { "timestamp": { "type": "string", "format": "date-time" } }
        });
        let doc = SchemaDoc::compile(Some(&schema)).unwrap();

        assert!(doc.validate(&json!({ "timestamp": "2024-05-01T10:00:00Z" })).valid);
        assert!(!doc.validate(&json!({ "timestamp": "yesterday" })).valid);
    }

    #[test]
    fn null_body_fails_an_object_schema() {
        let doc = SchemaDoc::compile(Some(&traffic_schema())).unwrap();
        assert!(!doc.validate(&Value::Null).valid);
    }

    #[test]
    fn uncompilable_schema_is_a_compile_error() {
        assert!(matches!(
            SchemaDoc::compile(Some(&json!({ "type": 12 }))),
            Err(SchemaError::Compile(_))
        ));
    }

    #[test]
    fn formatting_strips_root_prefix() {
        let errors = vec![
            "(root): \"priority\" is a required property".to_string(),
            "/volume: -10 is less than the minimum of 0".to_string(),
        ];
        assert_eq!(
            format_validation_errors(&errors),
            "\"priority\" is a required property; /volume: -10 is less than the minimum of 0"
        );
        assert_eq!(format_validation_errors(&[]), "");
    }
}
