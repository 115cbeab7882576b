use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// One route record as written in `routes.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub route_name: String,
    pub method: String,
    #[serde(default)]
    pub request_schema: Option<JsonValue>,
    #[serde(default)]
    pub response_schema: Option<JsonValue>,
    #[serde(default)]
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutesConfig {
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

pub fn parse_routes(raw: &str) -> Result<RoutesConfig> {
    serde_json::from_str(raw).context("failed to parse route configuration")
}

pub fn load_routes_file(path: &Path) -> Result<RoutesConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read route configuration '{}'", path.display()))?;
    let config = parse_routes(&raw)
        .with_context(|| format!("invalid route configuration in '{}'", path.display()))?;

    info!(
        routes = config.routes.len(),
        path = %path.display(),
        "loaded route configuration"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_camel_case_records_with_defaults() {
        let config = parse_routes(
            r#"{
                "routes": [
                    { "routeName": "/v1/status", "method": "GET" },
                    {
                        "routeName": "/v1/items",
                        "method": "POST",
                        "requestSchema": { "type": "object" },
                        "policies": ["a", "b"]
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.routes.len(), 2);
        assert!(config.routes[0].request_schema.is_none());
        assert!(config.routes[0].policies.is_empty());
        assert_eq!(config.routes[1].policies, vec!["a", "b"]);
    }

    #[test]
    fn bundled_routes_parse() {
        let config = parse_routes(control_plane_bundles::default_routes_json()).unwrap();
        assert!(config
            .routes
            .iter()
            .any(|route| route.route_name == "/v1/status" && route.method == "GET"));
    }

    #[test]
    fn reports_unreadable_and_malformed_files() {
        let temp = tempdir().unwrap();
        assert!(load_routes_file(&temp.path().join("missing.json")).is_err());

        let malformed = temp.path().join("routes.json");
        fs::write(&malformed, "{ routes: nope").unwrap();
        assert!(load_routes_file(&malformed).is_err());
    }
}
