use std::{fmt, str::FromStr};

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod config;
mod registry;

pub use config::{load_routes_file, parse_routes, RouteConfig, RoutesConfig};
pub use registry::{RouteDefinition, RouteRegistry};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route {method} {name} is registered more than once")]
    DuplicateRoute { method: RouteMethod, name: String },
    #[error("unsupported HTTP method '{0}'")]
    UnsupportedMethod(String),
    #[error("invalid {kind} schema for route '{route}': {reason}")]
    InvalidSchema {
        route: String,
        kind: &'static str,
        reason: String,
    },
    #[error("failed to load route configuration")]
    ConfigLoadError(#[source] AnyhowError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl RouteMethod {
    pub const ALL: [RouteMethod; 5] = [
        RouteMethod::Get,
        RouteMethod::Post,
        RouteMethod::Put,
        RouteMethod::Patch,
        RouteMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
            RouteMethod::Put => "PUT",
            RouteMethod::Patch => "PATCH",
            RouteMethod::Delete => "DELETE",
        }
    }

    /// Exact, case-sensitive match against the canonical token, as sent on the wire.
    pub fn from_token(token: &str) -> Option<RouteMethod> {
        RouteMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == token)
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteMethod {
    type Err = RouteError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RouteMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| RouteError::UnsupportedMethod(value.to_string()))
    }
}
