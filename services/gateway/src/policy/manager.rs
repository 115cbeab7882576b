use std::{collections::HashMap, path::Path};

use serde_json::Value as JsonValue;
use tracing::{debug, error, info};

use super::{collect_policy_sources, PolicyError, PolicyFault, PolicyOutcome, PolicyRule};

/// Named, compiled policies.
///
/// Populated during the load phase through `&mut self`; once it is wrapped in an
/// `Arc` and handed to the pipeline it is only ever read, so evaluations need no
/// locking.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    policies: HashMap<String, PolicyRule>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `source` and registers it under `name`, replacing any policy
    /// previously loaded under the same name.
    pub fn load(&mut self, name: &str, source: &str) -> Result<(), PolicyError> {
        let rule = PolicyRule::compile(name, source)?;
        if self.policies.insert(name.to_string(), rule).is_some() {
            debug!(policy = %name, "replaced previously loaded policy");
        }
        Ok(())
    }

    /// Loads every `*.rego` file in `directory`.
    ///
    /// Policies that fail to compile are logged and skipped; routes that reference
    /// them are denied at evaluation time. Only an unreadable directory is an error.
    pub fn load_dir(&mut self, directory: &Path) -> Result<usize, PolicyError> {
        let sources = collect_policy_sources(directory).map_err(PolicyError::SourceLoadError)?;

        let mut count = 0usize;
        for source in sources {
            match self.load(&source.name, &source.text) {
                Ok(()) => {
                    count += 1;
                    info!(policy = %source.name, origin = %source.origin.display(), "loaded policy");
                }
                Err(err) => {
                    error!(policy = %source.name, error = ?err, "failed to load policy");
                }
            }
        }

        Ok(count)
    }

    /// Loads the policies embedded in `control-plane-bundles`, with the same
    /// skip-on-failure behaviour as [`PolicyEngine::load_dir`].
    pub fn load_bundled(&mut self) -> usize {
        let mut count = 0usize;
        for (name, source) in control_plane_bundles::all_policies() {
            match self.load(name, source) {
                Ok(()) => {
                    count += 1;
                    info!(policy = %name, origin = "bundled", "loaded policy");
                }
                Err(err) => error!(policy = %name, error = ?err, "failed to load bundled policy"),
            }
        }
        count
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn policy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        names.sort();
        names
    }

    /// Evaluates one policy. An unknown name, an engine error or a non-boolean
    /// result all deny.
    pub fn evaluate(&self, name: &str, input: &JsonValue) -> PolicyOutcome {
        let Some(rule) = self.policies.get(name) else {
            debug!(policy = %name, "policy not loaded; denying");
            return PolicyOutcome::fault(name, PolicyFault::NotFound);
        };

        match rule.evaluate(input) {
            Ok(true) => PolicyOutcome::allow(),
            Ok(false) => PolicyOutcome::deny(name),
            Err(fault) => {
                error!(policy = %name, error = %fault, "policy evaluation failed");
                PolicyOutcome::fault(name, fault)
            }
        }
    }

    /// Logical AND over `names`, in order, stopping at the first policy that
    /// does not allow. No names means no gate.
    pub fn evaluate_all<S: AsRef<str>>(&self, names: &[S], input: &JsonValue) -> PolicyOutcome {
        for name in names {
            let outcome = self.evaluate(name.as_ref(), input);
            if !outcome.allowed {
                debug!(denied_by = %name.as_ref(), "policy chain short-circuited");
                return outcome;
            }
        }

        PolicyOutcome::allow()
    }
}
