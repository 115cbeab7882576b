use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One inbound call, as the pipeline sees it. Built once per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,
}

impl PipelineInput {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Header names are stored lower-cased; the first value for a name wins.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.as_ref().to_ascii_lowercase())
            .or_insert_with(|| value.into());
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Body to validate: a missing body is checked as `null`.
    pub fn body_or_null(&self) -> &JsonValue {
        self.body.as_ref().unwrap_or(&JsonValue::Null)
    }

    /// The document handed to Rego as `input`.
    pub fn policy_input(&self) -> JsonValue {
        let headers: Map<String, JsonValue> = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), JsonValue::String(value.clone())))
            .collect();

        let mut input = Map::new();
        input.insert("method".to_string(), JsonValue::String(self.method.clone()));
        input.insert("path".to_string(), JsonValue::String(self.path.clone()));
        input.insert("headers".to_string(), JsonValue::Object(headers));
        if let Some(body) = &self.body {
            input.insert("body".to_string(), body.clone());
        }

        JsonValue::Object(input)
    }
}
