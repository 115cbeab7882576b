use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use control_plane_gateway::{
    MockResponder, Pipeline, PipelineInput, PolicyEngine, RouteRegistry,
};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const TRAFFIC_PATH: &str = "/v1/services/service123/traffic";

/// The bundled demo configuration, with policies loaded from disk the way the
/// gateway does when `POLICIES_DIR` is set.
pub struct PipelineBenchFixture {
    pub pipeline: Arc<Pipeline>,
    pub policies: Arc<PolicyEngine>,
    pub policy_dir: TempDir,
}

impl PipelineBenchFixture {
    pub fn new() -> Result<Self> {
        let policy_dir = TempDir::new().context("failed to create policy dir")?;
        write_bundled_policies(policy_dir.path())?;

        let mut engine = PolicyEngine::new();
        let loaded = engine.load_dir(policy_dir.path())?;
        tracing::debug!(loaded, "bench policies loaded");
        let policies = Arc::new(engine);

        let registry = RouteRegistry::load(None)?;
        let pipeline = Pipeline::new(
            Arc::new(registry),
            Arc::clone(&policies),
            MockResponder::new(),
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            policies,
            policy_dir,
        })
    }
}

fn write_bundled_policies(dir: &Path) -> Result<()> {
    for (name, source) in control_plane_bundles::all_policies() {
        let path = dir.join(format!("{name}.rego"));
        fs::write(&path, source)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
    }
    Ok(())
}

pub fn traffic_body(traffic_type: &str, volume: f64, priority: &str) -> Value {
    json!({
        "trafficType": traffic_type,
        "volume": volume,
        "priority": priority,
        "metadata": { "source": "bench-a", "destination": "bench-b" }
    })
}

pub fn traffic_request(body: Value) -> PipelineInput {
    PipelineInput::new("POST", TRAFFIC_PATH)
        .with_header("content-type", "application/json")
        .with_body(body)
}

pub fn allowed_traffic() -> PipelineInput {
    traffic_request(traffic_body("incoming", 100.5, "medium"))
}

/// Denied by `traffic_policy`. The request schema rejects it first, so benches
/// feed it to the policy engine directly.
pub fn rejected_traffic() -> PipelineInput {
    traffic_request(traffic_body("incoming", 100.5, "urgent"))
}

pub fn invalid_traffic() -> PipelineInput {
    traffic_request(json!({ "trafficType": "invalid", "volume": -10, "priority": "wrong" }))
}
