use crate::domain::Payload;
use crate::persona::StaticPersonaCatalog;
use crate::roles::{ProcessRole, Role, RoleLayout, RoleRegistry};
use crate::workflow::OrchestratorSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DECISION_YAML: &str = include_str!("../decision.yaml");

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub roles: HashMap<String, RoleConfig>,
    pub workflow: RoleLayout,
    /// Persona used when a request does not name one.
    #[serde(default)]
    pub default_persona: Option<String>,
    #[serde(default)]
    pub personas: HashMap<String, PersonaConfig>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoleConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PersonaConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub attributes: Payload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Seconds a role may go without output before it is failed. Default: 300
    #[serde(default = "default_role_activity_timeout_secs")]
    pub role_activity_timeout_secs: u64,
    /// Seconds a finished decision is kept before `DecisionService::prune` may
    /// evict it. Used by long-lived embedders; the CLI does not prune. Default: 3600
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Directory for JSONL journals. Defaults to the engine home.
    #[serde(default)]
    pub journal_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            role_activity_timeout_secs: default_role_activity_timeout_secs(),
            retention_secs: default_retention_secs(),
            journal_dir: None,
        }
    }
}

fn default_role_activity_timeout_secs() -> u64 {
    300
}

fn default_retention_secs() -> u64 {
    3600
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// The configuration embedded from `decision.yaml`.
    pub fn default_config() -> Result<Self> {
        Self::from_yaml(DEFAULT_DECISION_YAML).context("Embedded decision.yaml is invalid")
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse config as YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let stages = std::iter::once(("Framing", &self.workflow.framing))
            .chain(self.workflow.parallel.iter().map(|name| ("Parallel", name)))
            .chain(std::iter::once(("Synthesis", &self.workflow.synthesis)));
        for (stage, name) in stages {
            if !self.roles.contains_key(name) {
                anyhow::bail!("{} role '{}' not found in roles configuration", stage, name);
            }
        }

        if self.workflow.parallel.is_empty() {
            anyhow::bail!("At least one parallel role must be configured");
        }

        if let Some(persona) = &self.default_persona {
            if !self.personas.contains_key(persona) {
                anyhow::bail!("Default persona '{}' not found in personas", persona);
            }
        }

        if self.runtime.role_activity_timeout_secs == 0 {
            anyhow::bail!("runtime.role_activity_timeout_secs must be greater than zero");
        }

        for (name, role) in &self.roles {
            if role.command.trim().is_empty() {
                anyhow::bail!("Role '{}' has an empty command", name);
            }
        }

        Ok(())
    }

    /// One process-backed role per configured entry, sorted by name.
    pub fn build_roles(&self) -> Vec<Arc<dyn Role>> {
        let mut names: Vec<&String> = self.roles.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| {
                let config = self.roles.get(name)?;
                let mut role = ProcessRole::new(name.as_str(), config.command.as_str())
                    .with_args(config.args.clone());
                if let Some(dir) = &config.working_dir {
                    role = role.with_working_dir(dir.clone());
                }
                Some(Arc::new(role) as Arc<dyn Role>)
            })
            .collect()
    }

    pub fn build_registry(&self) -> Result<RoleRegistry> {
        Ok(RoleRegistry::from_roles(self.build_roles(), &self.workflow)?)
    }

    pub fn persona_catalog(&self) -> StaticPersonaCatalog {
        StaticPersonaCatalog::from_config(&self.personas)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            role_activity_timeout: Duration::from_secs(self.runtime.role_activity_timeout_secs),
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        let secs = i64::try_from(self.runtime.retention_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
