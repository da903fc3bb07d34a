//! Ordered, validated collection of roles arranged into workflow stages.

use crate::domain::{RoleId, WorkflowError};
use crate::roles::Role;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Which role runs in which stage, by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleLayout {
    pub framing: String,
    pub parallel: Vec<String>,
    pub synthesis: String,
}

/// Roles resolved against a [`RoleLayout`].
pub struct RoleRegistry {
    framing: Arc<dyn Role>,
    parallel: Vec<Arc<dyn Role>>,
    synthesis: Arc<dyn Role>,
}

impl std::fmt::Debug for RoleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("framing", self.framing.id())
            .field(
                "parallel",
                &self.parallel.iter().map(|r| r.id()).collect::<Vec<_>>(),
            )
            .field("synthesis", self.synthesis.id())
            .finish()
    }
}

impl RoleRegistry {
    /// Builds the registry, rejecting duplicate, unknown, reused or reserved ids.
    pub fn from_roles(
        roles: Vec<Arc<dyn Role>>,
        layout: &RoleLayout,
    ) -> Result<Self, WorkflowError> {
        let mut by_id: HashMap<RoleId, Arc<dyn Role>> = HashMap::new();
        for role in roles {
            let id = role.id().clone();
            if id.is_workflow() {
                return Err(WorkflowError::InvalidLayout {
                    message: format!("role id '{}' is reserved", id),
                });
            }
            if by_id.insert(id.clone(), role).is_some() {
                return Err(WorkflowError::InvalidLayout {
                    message: format!("duplicate role id '{}'", id),
                });
            }
        }

        if layout.parallel.is_empty() {
            return Err(WorkflowError::InvalidLayout {
                message: "at least one parallel role is required".to_string(),
            });
        }

        let mut used = HashSet::new();
        let mut resolve = |name: &str| -> Result<Arc<dyn Role>, WorkflowError> {
            let id = RoleId::from(name);
            if id.is_workflow() {
                return Err(WorkflowError::InvalidLayout {
                    message: format!("role id '{}' is reserved", id),
                });
            }
            let role = by_id
                .get(&id)
                .cloned()
                .ok_or_else(|| WorkflowError::UnknownRole {
                    role: name.to_string(),
                })?;
            if !used.insert(id) {
                return Err(WorkflowError::InvalidLayout {
                    message: format!("role '{}' appears in more than one stage slot", name),
                });
            }
            Ok(role)
        };

        let framing = resolve(&layout.framing)?;
        let parallel = layout
            .parallel
            .iter()
            .map(|name| resolve(name))
            .collect::<Result<Vec<_>, _>>()?;
        let synthesis = resolve(&layout.synthesis)?;

        Ok(Self {
            framing,
            parallel,
            synthesis,
        })
    }

    pub fn framing(&self) -> &Arc<dyn Role> {
        &self.framing
    }

    pub fn parallel(&self) -> &[Arc<dyn Role>] {
        &self.parallel
    }

    pub fn synthesis(&self) -> &Arc<dyn Role> {
        &self.synthesis
    }

    /// Total number of roles a run executes.
    pub fn role_count(&self) -> usize {
        self.parallel.len() + 2
    }

    /// Role ids in execution order.
    pub fn role_ids(&self) -> Vec<RoleId> {
        std::iter::once(&self.framing)
            .chain(self.parallel.iter())
            .chain(std::iter::once(&self.synthesis))
            .map(|role| role.id().clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
