//! Persona lookup: maps a request's persona key to the context roles run under.

use crate::config::PersonaConfig;
use crate::domain::PersonaContext;
use async_trait::async_trait;
use std::collections::HashMap;

/// Source of persona contexts.
#[async_trait]
pub trait PersonaCatalog: Send + Sync {
    async fn lookup(&self, key: &str) -> Option<PersonaContext>;
}

/// Catalog backed by a fixed map, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticPersonaCatalog {
    personas: HashMap<String, PersonaContext>,
}

impl StaticPersonaCatalog {
    pub fn new(personas: HashMap<String, PersonaContext>) -> Self {
        Self { personas }
    }

    pub fn from_config(personas: &HashMap<String, PersonaConfig>) -> Self {
        let personas = personas
            .iter()
            .map(|(key, config)| {
                let context = PersonaContext {
                    key: key.clone(),
                    description: config.description.clone(),
                    assumptions: config.assumptions.clone(),
                    attributes: config.attributes.clone(),
                };
                (key.clone(), context)
            })
            .collect();
        Self { personas }
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

#[async_trait]
impl PersonaCatalog for StaticPersonaCatalog {
    async fn lookup(&self, key: &str) -> Option<PersonaContext> {
        self.personas.get(key).cloned()
    }
}
