use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use tracing::debug;

use super::{ProducerError, ResponseProducer};
use crate::{pipeline::PipelineInput, routes::RouteDefinition};

pub const STATUS_ROUTE: &str = "/v1/status";
pub const SERVICE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRequest {
    pub traffic_type: String,
    pub volume: f64,
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, JsonValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficResponse {
    pub id: String,
    pub service_id: String,
    pub status: String,
    pub message: String,
    pub timestamp: String,
}

/// Stand-in backend: canned status and traffic responses, echo for everything else.
#[derive(Debug, Clone)]
pub struct MockResponder {
    started_at: Instant,
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResponder {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn status_response(&self) -> StatusResponse {
        StatusResponse {
            status: "healthy".to_string(),
            timestamp: rfc3339(Utc::now()),
            version: SERVICE_VERSION.to_string(),
            uptime: self.started_at.elapsed().as_secs(),
        }
    }

    pub fn traffic_response(&self, service_id: &str, request: &TrafficRequest) -> TrafficResponse {
        let now = Utc::now();
        debug!(
            service_id,
            traffic_type = %request.traffic_type,
            priority = %request.priority,
            "accepting mock traffic request"
        );

        TrafficResponse {
            id: format!("traffic-{}", now.format("%Y%m%d%H%M%S")),
            service_id: service_id.to_string(),
            status: "accepted".to_string(),
            message: "Traffic request processed successfully".to_string(),
            timestamp: rfc3339(now),
        }
    }
}

impl ResponseProducer for MockResponder {
    fn produce(
        &self,
        route: &RouteDefinition,
        input: &PipelineInput,
    ) -> Result<JsonValue, ProducerError> {
        if route.name == STATUS_ROUTE {
            return Ok(serde_json::to_value(self.status_response())?);
        }

        if is_traffic_route(&route.name) {
            let service_id = extract_service_id(&input.path)
                .ok_or_else(|| ProducerError::MissingServiceId(input.path.clone()))?;
            let body = input.body.clone().unwrap_or(JsonValue::Null);
            let request: TrafficRequest = serde_json::from_value(body)
                .map_err(|err| ProducerError::InvalidTrafficRequest(err.to_string()))?;

            return Ok(serde_json::to_value(
                self.traffic_response(service_id, &request),
            )?);
        }

        let mut response = json!({
            "message": format!("{} request processed successfully", route.method),
            "route": route.name,
            "method": route.method.as_str(),
        });
        if let Some(body) = &input.body {
            response["data"] = body.clone();
        }

        Ok(response)
    }
}

fn is_traffic_route(name: &str) -> bool {
    name.contains("/services/") && name.ends_with("/traffic")
}

/// `/v1/services/<id>/traffic` carries the service id in its fourth segment.
fn extract_service_id(path: &str) -> Option<&str> {
    path.split('/').nth(3).filter(|segment| !segment.is_empty())
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
