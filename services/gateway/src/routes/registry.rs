use std::{collections::HashMap, path::Path};

use tracing::{info, warn};

use super::{load_routes_file, parse_routes, RouteConfig, RouteError, RouteMethod, RoutesConfig};
use crate::schema::SchemaDoc;

/// A configured endpoint. Built during the load phase and immutable afterwards.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    pub name: String,
    pub method: RouteMethod,
    pub request_schema: SchemaDoc,
    pub response_schema: SchemaDoc,
    pub policy_names: Vec<String>,
}

impl RouteDefinition {
    pub fn new(method: RouteMethod, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            request_schema: SchemaDoc::Unconstrained,
            response_schema: SchemaDoc::Unconstrained,
            policy_names: Vec::new(),
        }
    }

    pub fn with_request_schema(mut self, schema: SchemaDoc) -> Self {
        self.request_schema = schema;
        self
    }

    pub fn with_response_schema(mut self, schema: SchemaDoc) -> Self {
        self.response_schema = schema;
        self
    }

    pub fn with_policies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Compiles one configuration record.
    pub fn from_config(config: &RouteConfig) -> Result<Self, RouteError> {
        let method = config.method.parse::<RouteMethod>()?;

        let compile = |kind: &'static str, schema: Option<&serde_json::Value>| {
            SchemaDoc::compile(schema).map_err(|err| RouteError::InvalidSchema {
                route: config.route_name.clone(),
                kind,
                reason: err.to_string(),
            })
        };

        Ok(Self {
            name: config.route_name.clone(),
            method,
            request_schema: compile("request", config.request_schema.as_ref())?,
            response_schema: compile("response", config.response_schema.as_ref())?,
            policy_names: config.policies.clone(),
        })
    }

    /// `"<METHOD> <path>"`, as listed by introspection endpoints.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.name)
    }
}

/// Routes keyed by `(method, name)`, matched literally.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<RouteDefinition>,
    index: HashMap<(RouteMethod, String), usize>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a parsed route table.
    ///
    /// Records with an unsupported method are logged and skipped. A schema that
    /// does not compile or a repeated `(method, name)` fails the whole table.
    pub fn from_config(config: &RoutesConfig) -> Result<Self, RouteError> {
        let mut registry = Self::new();

        for record in &config.routes {
            let route = match RouteDefinition::from_config(record) {
                Ok(route) => route,
                Err(RouteError::UnsupportedMethod(method)) => {
                    warn!(
                        route = %record.route_name,
                        %method,
                        "skipping route with unsupported HTTP method"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            let method = route.method;
            registry.register(route)?;
            info!(
                %method,
                route = %record.route_name,
                policies = ?record.policies,
                "registered route"
            );
        }

        Ok(registry)
    }

    /// Reads the route table at `path`, or the bundled table when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, RouteError> {
        let config = match path {
            Some(path) => load_routes_file(path),
            None => parse_routes(control_plane_bundles::default_routes_json()),
        }
        .map_err(RouteError::ConfigLoadError)?;

        Self::from_config(&config)
    }

    pub fn register(&mut self, route: RouteDefinition) -> Result<(), RouteError> {
        let key = (route.method, route.name.clone());
        if self.index.contains_key(&key) {
            return Err(RouteError::DuplicateRoute {
                method: route.method,
                name: route.name,
            });
        }

        self.index.insert(key, self.routes.len());
        self.routes.push(route);
        Ok(())
    }

    /// Exact match on method and path. The method token is case-sensitive; unknown
    /// method strings never match.
    pub fn resolve(&self, method: &str, path: &str) -> Option<&RouteDefinition> {
        let method = RouteMethod::from_token(method)?;
        self.index
            .get(&(method, path.to_string()))
            .and_then(|position| self.routes.get(*position))
    }

    /// Methods registered for a literal path, in canonical method order.
    pub fn methods_for(&self, path: &str) -> Vec<RouteMethod> {
        RouteMethod::ALL
            .into_iter()
            .filter(|method| self.index.contains_key(&(*method, path.to_string())))
            .collect()
    }

    /// All routes in registration order.
    pub fn list(&self) -> &[RouteDefinition] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{
        fs, io,
        sync::{Arc, Mutex},
    };
    use tempfile::tempdir;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn resolves_exact_method_and_path() {
        let mut registry = RouteRegistry::new();
        registry
            .register(RouteDefinition::new(RouteMethod::Get, "/v1/status"))
            .unwrap();

        assert!(registry.resolve("GET", "/v1/status").is_some());
        assert!(registry.resolve("get", "/v1/status").is_none());
        assert!(registry.resolve("Get", "/v1/status").is_none());
        assert!(registry.resolve("POST", "/v1/status").is_none());
        assert!(registry.resolve("GET", "/v1/status/").is_none());
        assert!(registry.resolve("GET", "/v1/STATUS").is_none());
        assert!(registry.resolve("BREW", "/v1/status").is_none());
    }

    #[test]
    fn path_segments_are_not_patterns() {
        let mut registry = RouteRegistry::new();
        registry
            .register(RouteDefinition::new(
                RouteMethod::Post,
                "/v1/services/:serviceId/traffic",
            ))
            .unwrap();

        assert!(registry
            .resolve("POST", "/v1/services/service123/traffic")
            .is_none());
        assert!(registry
            .resolve("POST", "/v1/services/:serviceId/traffic")
            .is_some());
    }

    #[test]
    fn rejects_duplicate_identity() {
        let mut registry = RouteRegistry::new();
        registry
            .register(RouteDefinition::new(RouteMethod::Get, "/v1/status"))
            .unwrap();
        registry
            .register(RouteDefinition::new(RouteMethod::Post, "/v1/status"))
            .unwrap();

        let err = registry
            .register(RouteDefinition::new(RouteMethod::Get, "/v1/status"))
            .unwrap_err();
        assert!(matches!(
            err,
            RouteError::DuplicateRoute { method: RouteMethod::Get, ref name } if name == "/v1/status"
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lists_methods_for_a_path() {
        let mut registry = RouteRegistry::new();
        registry
            .register(RouteDefinition::new(RouteMethod::Post, "/v1/items"))
            .unwrap();
        registry
            .register(RouteDefinition::new(RouteMethod::Get, "/v1/items"))
            .unwrap();

        assert_eq!(
            registry.methods_for("/v1/items"),
            vec![RouteMethod::Get, RouteMethod::Post]
        );
        assert!(registry.methods_for("/v1/other").is_empty());
    }

    #[test]
    fn builds_from_config_skipping_unsupported_methods() {
        let config = parse_routes(
            r#"{
                "routes": [
                    { "routeName": "/v1/status", "method": "GET", "requestSchema": {} },
                    { "routeName": "/v1/trace", "method": "TRACE" },
                    {
                        "routeName": "/v1/items",
                        "method": "POST",
                        "requestSchema": { "type": "object", "required": ["id"] },
                        "policies": ["item_policy"]
                    }
                ]
            }"#,
        )
        .unwrap();

        let registry = RouteRegistry::from_config(&config).unwrap();
        let endpoints: Vec<String> = registry.list().iter().map(|r| r.endpoint()).collect();
        assert_eq!(endpoints, vec!["GET /v1/status", "POST /v1/items"]);

        let status = registry.resolve("GET", "/v1/status").unwrap();
        assert!(status.request_schema.is_unconstrained());

        let items = registry.resolve("POST", "/v1/items").unwrap();
        assert!(!items.request_schema.is_unconstrained());
        assert_eq!(items.policy_names, vec!["item_policy"]);
        assert!(!items.request_schema.validate(&json!({})).valid);
    }

    #[test]
    fn duplicate_records_fail_the_table() {
        let config = parse_routes(
            r#"{
                "routes": [
                    { "routeName": "/v1/status", "method": "GET" },
                    { "routeName": "/v1/status", "method": "get" }
                ]
            }"#,
        )
        .unwrap();

        assert!(matches!(
            RouteRegistry::from_config(&config),
            Err(RouteError::DuplicateRoute { .. })
        ));
    }

    #[test]
    fn rejected_duplicate_is_not_logged_as_registered() {
        let config = parse_routes(
            r#"{
                "routes": [
                    { "routeName": "/v1/status", "method": "GET" },
                    { "routeName": "/v1/status", "method": "GET" }
                ]
            }"#,
        )
        .unwrap();

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();
        let result =
            tracing::subscriber::with_default(subscriber, || RouteRegistry::from_config(&config));

        assert!(matches!(result, Err(RouteError::DuplicateRoute { .. })));
        assert_eq!(logs.contents().matches("registered route").count(), 1);
    }

    #[test]
    fn config_methods_are_case_insensitive_but_requests_are_not() {
        let config = parse_routes(
            r#"{ "routes": [{ "routeName": "/v1/status", "method": "get" }] }"#,
        )
        .unwrap();

        let registry = RouteRegistry::from_config(&config).unwrap();
        assert!(registry.resolve("GET", "/v1/status").is_some());
        assert!(registry.resolve("get", "/v1/status").is_none());
        assert_eq!(registry.methods_for("/v1/status"), vec![RouteMethod::Get]);
    }

    #[test]
    fn invalid_schema_fails_the_table() {
        let config = parse_routes(
            r#"{
                "routes": [
                    { "routeName": "/v1/items", "method": "POST", "responseSchema": ["object"] }
                ]
            }"#,
        )
        .unwrap();

        assert!(matches!(
            RouteRegistry::from_config(&config),
            Err(RouteError::InvalidSchema { kind: "response", .. })
        ));
    }

    #[test]
    fn loads_bundled_table_or_file() {
        let bundled = RouteRegistry::load(None).unwrap();
        assert!(bundled.resolve("GET", "/v1/status").is_some());
        assert!(bundled
            .resolve("POST", "/v1/services/service123/traffic")
            .is_some());

        let temp = tempdir().unwrap();
        let path = temp.path().join("routes.json");
        fs::write(
            &path,
            r#"{ "routes": [{ "routeName": "/v1/ping", "method": "GET" }] }"#,
        )
        .unwrap();
        let registry = RouteRegistry::load(Some(path.as_path())).unwrap();
        assert_eq!(registry.len(), 1);

        assert!(matches!(
            RouteRegistry::load(Some(temp.path().join("absent.json").as_path())),
            Err(RouteError::ConfigLoadError(_))
        ));
    }
}
