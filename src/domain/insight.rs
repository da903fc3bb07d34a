//! Insights: the durable result a completed role contributes.

use crate::domain::types::{Confidence, Payload, RoleId};
use serde::{Deserialize, Serialize};

/// Final structured summary produced by one role for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub role: RoleId,
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Insight {
    pub fn new(role: RoleId, summary: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            role,
            summary: summary.into(),
            findings: Vec::new(),
            confidence,
            payload: None,
        }
    }

    pub fn with_findings(mut self, findings: Vec<String>) -> Self {
        self.findings = findings;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }
}
