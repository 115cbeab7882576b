use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error};

/// Rego source text read during the load phase, keyed by policy name.
#[derive(Debug, Clone)]
pub struct PolicySource {
    pub name: String,
    pub origin: PathBuf,
    pub text: String,
}

/// Reads every `*.rego` file directly inside `directory`; the policy name is the
/// file stem. Subdirectories are ignored. Sources come back sorted by name.
///
/// A file that cannot be read is logged and skipped; only a missing or
/// unreadable directory is an error.
pub fn collect_policy_sources(directory: &Path) -> Result<Vec<PolicySource>> {
    let metadata = fs::metadata(directory).with_context(|| {
        format!(
            "policies path '{}' does not exist or is not accessible",
            directory.display()
        )
    })?;

    if !metadata.is_dir() {
        return Err(anyhow!(
            "policies path '{}' is not a directory",
            directory.display()
        ));
    }

    let mut sources = Vec::new();
    for entry in fs::read_dir(directory)
        .with_context(|| format!("failed to read directory '{}'", directory.display()))?
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                error!(
                    policies_dir = %directory.display(),
                    error = ?err,
                    "failed to read directory entry"
                );
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false) {
            continue;
        }

        if path.extension().and_then(|ext| ext.to_str()) != Some("rego") {
            continue;
        }

        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                error!(
                    policy = %name,
                    origin = %path.display(),
                    error = ?err,
                    "failed to read policy file"
                );
                continue;
            }
        };

        sources.push(PolicySource {
            name: name.to_string(),
            origin: path.clone(),
            text,
        });
    }

    sources.sort_by(|a, b| a.name.cmp(&b.name));

    debug!(
        policies_dir = %directory.display(),
        policies = sources.len(),
        "collected policy sources"
    );

    Ok(sources)
}
