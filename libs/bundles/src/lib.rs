//! Embedded default configuration for the Dynamic Control Plane gateway.
//!
//! This library ships the Rego policies and the route table the gateway falls
//! back to when no on-disk configuration is supplied:
//! - **Policies** (`policies/`): one Rego module per policy, named after its package
//! - **Routes** (`routes/routes.json`): the demo route table referencing those policies
//!
//! Everything is embedded at compile-time using `include_dir`.
//!
//! ## Usage
//!
//! ```rust
//! use control_plane_bundles::{default_routes_json, list_policies, load_policy};
//!
//! let names = list_policies();
//! assert!(names.contains(&"traffic_policy"));
//!
//! let source = load_policy("traffic_policy").expect("traffic policy is bundled");
//! assert!(source.contains("package traffic_policy"));
//!
//! let routes = default_routes_json();
//! assert!(routes.contains("/v1/status"));
//! ```

use include_dir::{include_dir, Dir};
use tracing::warn;

static POLICIES: Dir = include_dir!("$CARGO_MANIFEST_DIR/policies");
static ROUTES: Dir = include_dir!("$CARGO_MANIFEST_DIR/routes");

const ROUTES_FILE: &str = "routes.json";

/// Returns the names of the bundled policies (file stems under `policies/`), sorted.
///
/// Example: ["service_policy", "status_policy", "traffic_policy"]
pub fn list_policies() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = POLICIES
        .files()
        .filter_map(|file| {
            let path = file.path();
            if path.extension()? == "rego" {
                path.file_stem()?.to_str()
            } else {
                None
            }
        })
        .collect();
    names.sort_unstable();
    names
}

/// Loads a bundled policy by name.
///
/// Example: `load_policy("traffic_policy")` loads `policies/traffic_policy.rego`
pub fn load_policy(name: &str) -> Option<&'static str> {
    let path = format!("{name}.rego");
    let file = POLICIES.get_file(&path)?;
    let contents = file.contents_utf8();
    if contents.is_none() {
        warn!(target: "control-plane-bundles", "bundled policy {name} is not valid UTF-8");
    }
    contents
}

/// Returns every bundled policy as `(name, source)` pairs, in name order.
pub fn all_policies() -> Vec<(&'static str, &'static str)> {
    list_policies()
        .into_iter()
        .filter_map(|name| Some((name, load_policy(name)?)))
        .collect()
}

/// Raw text of the bundled route table.
pub fn default_routes_json() -> &'static str {
    ROUTES
        .get_file(ROUTES_FILE)
        .and_then(|file| file.contents_utf8())
        .unwrap_or(r#"{"routes":[]}"#)
}
