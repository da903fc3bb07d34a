//! Home-based storage paths under `~/.decision-engine/`:
//! - `journals/` - JSONL event journals, one file per decision
//! - `decision.yaml` - User configuration, used when `--config` is not given

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the engine directory inside the user's home.
const ENGINE_DIR: &str = ".decision-engine";

/// Overrides the engine home directory when set.
pub const HOME_ENV: &str = "DECISION_ENGINE_HOME";

/// Returns the engine home directory, creating it if needed.
///
/// `DECISION_ENGINE_HOME` takes precedence over `~/.decision-engine/`.
pub fn engine_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .context("Could not determine home directory for decision storage")?
            .join(ENGINE_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create engine directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the journals directory: `<home>/journals/`
pub fn journals_dir() -> Result<PathBuf> {
    let dir = engine_home_dir()?.join("journals");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create journals directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the user config path if the file exists: `<home>/decision.yaml`
pub fn user_config_path() -> Result<Option<PathBuf>> {
    let path = engine_home_dir()?.join("decision.yaml");
    Ok(path.is_file().then_some(path))
}

#[cfg(test)]
#[path = "tests/paths_tests.rs"]
mod tests;
