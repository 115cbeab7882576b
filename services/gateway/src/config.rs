use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Route table on disk; `None` uses the bundled routes.
    pub routes_config: Option<PathBuf>,
    /// Directory of `*.rego` files; `None` uses the bundled policies.
    pub policies_dir: Option<PathBuf>,
    pub request_timeout_ms: u64,
    pub enforce_response_schema: bool,
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            routes_config: None,
            policies_dir: None,
            request_timeout_ms: 1000,
            enforce_response_schema: false,
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup` on top of the defaults. Blank values are
    /// ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = GatewayConfig::default();

        if let Some(host) = var("GATEWAY_HOST") {
            config.server_host = host;
        }

        if let Some(port) = var("PORT") {
            config.server_port = port
                .trim()
                .parse::<u16>()
                .context("failed to parse PORT as u16")?;
        }

        if let Some(path) = var("ROUTES_CONFIG") {
            config.routes_config = Some(absolutize(PathBuf::from(path)));
        }

        if let Some(dir) = var("POLICIES_DIR") {
            config.policies_dir = Some(absolutize(PathBuf::from(dir)));
        }

        if let Some(timeout) = var("REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = timeout
                .trim()
                .parse::<u64>()
                .context("failed to parse REQUEST_TIMEOUT_MS as u64")?;
        }

        if let Some(flag) = var("ENFORCE_RESPONSE_SCHEMA") {
            config.enforce_response_schema = parse_bool(flag.trim())
                .context("failed to parse ENFORCE_RESPONSE_SCHEMA as bool")?;
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;

        info!(
            routes = %describe(config.routes_config.as_deref()),
            policies = %describe(config.policies_dir.as_deref()),
            "gateway configuration resolved"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(anyhow!("REQUEST_TIMEOUT_MS must be greater than zero"));
        }
        if let Some(path) = &self.routes_config {
            validate_routes_file(path)?;
        }
        if let Some(dir) = &self.policies_dir {
            validate_policies_dir(dir)?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

fn describe(path: Option<&Path>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_else(|| "bundled".to_string())
}

fn parse_bool(value: &str) -> Result<bool> {
    value.parse::<bool>().or_else(|_| match value {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(anyhow!("invalid boolean value: {}", other)),
    })
}

fn validate_routes_file(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).with_context(|| {
        format!(
            "routes configuration '{}' does not exist or is not accessible",
            path.display()
        )
    })?;

    if !metadata.is_file() {
        return Err(anyhow!(
            "routes configuration '{}' is not a file",
            path.display()
        ));
    }

    Ok(())
}

fn validate_policies_dir(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).with_context(|| {
        format!(
            "policies directory '{}' does not exist or is not accessible",
            path.display()
        )
    })?;

    if !metadata.is_dir() {
        return Err(anyhow!(
            "policies directory '{}' is not a directory",
            path.display()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.request_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn overrides_are_parsed() {
        let temp = tempdir().unwrap();
        let routes = temp.path().join("routes.json");
        fs::write(&routes, r#"{ "routes": [] }"#).unwrap();

        let config = GatewayConfig::from_lookup(lookup(&[
            ("GATEWAY_HOST", "127.0.0.1"),
            ("PORT", "9090"),
            ("ROUTES_CONFIG", routes.to_str().unwrap()),
            ("POLICIES_DIR", temp.path().to_str().unwrap()),
            ("REQUEST_TIMEOUT_MS", "250"),
            ("ENFORCE_RESPONSE_SCHEMA", "1"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:9090");
        assert_eq!(config.routes_config.as_deref(), Some(routes.as_path()));
        assert_eq!(config.policies_dir.as_deref(), Some(temp.path()));
        assert_eq!(config.request_timeout_ms, 250);
        assert!(config.enforce_response_schema);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn rejects_bad_values_and_missing_paths() {
        assert!(GatewayConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("REQUEST_TIMEOUT_MS", "0")])).is_err());
        assert!(
            GatewayConfig::from_lookup(lookup(&[("ENFORCE_RESPONSE_SCHEMA", "maybe")])).is_err()
        );
        assert!(
            GatewayConfig::from_lookup(lookup(&[("POLICIES_DIR", "/definitely/not/here")]))
                .is_err()
        );

        let temp = tempdir().unwrap();
        let as_file = GatewayConfig::from_lookup(lookup(&[(
            "ROUTES_CONFIG",
            temp.path().to_str().unwrap(),
        )]));
        assert!(as_file.is_err());
    }

    #[test]
    fn parses_boolean_spellings() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("yes").is_err());
    }
}
