use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{error, info};

use crate::config::ProjectConfig;

/// Loads a project's static YAML config file and validates it.
///
/// Credentials never live in this file; they are resolved from the
/// environment when the gateway is constructed.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ProjectConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let project: ProjectConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let mut seen = HashSet::new();
    for page in &project.pages {
        if page.name.trim().is_empty() {
            anyhow::bail!("tracked document with empty name in {:?}", path_ref);
        }
        if !seen.insert(page.name.as_str()) {
            anyhow::bail!("duplicate tracked document name '{}'", page.name);
        }
        // Resolving the id here surfaces a missing page_id/url before any
        // network work starts.
        page.remote_id()?;
    }

    project.trace_loaded();
    Ok(project)
}
