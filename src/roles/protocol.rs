//! Line protocol spoken by process-backed roles.
//!
//! The role process writes one JSON object per stdout line:
//!
//! ```text
//! {"phase":"analyzing","message":"reading market data","confidence":0.4}
//! {"phase":"completed","message":"go","insight":{"summary":"go","findings":["..."],"confidence":0.8}}
//! ```
//!
//! Any line that is not such an object is forwarded verbatim as progress.

use crate::domain::{Confidence, Insight, Payload, Phase, RoleId};
use crate::roles::RoleUpdate;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RoleLine {
    phase: Phase,
    #[serde(default)]
    message: String,
    #[serde(default)]
    confidence: Option<Confidence>,
    #[serde(default)]
    payload: Option<Payload>,
    #[serde(default)]
    insight: Option<InsightLine>,
}

#[derive(Debug, Deserialize)]
struct InsightLine {
    summary: String,
    #[serde(default)]
    findings: Vec<String>,
    #[serde(default)]
    confidence: Option<Confidence>,
    #[serde(default)]
    payload: Option<Payload>,
}

/// Parses one stdout line from `role`. Blank lines yield nothing.
pub fn parse_role_line(role: &RoleId, line: &str) -> Option<RoleUpdate> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = match serde_json::from_str::<RoleLine>(trimmed) {
        Ok(parsed) => parsed,
        Err(_) => return Some(RoleUpdate::progress(trimmed)),
    };

    let insight = parsed.insight.map(|line| {
        let confidence = line
            .confidence
            .or(parsed.confidence)
            .unwrap_or_else(|| Confidence::clamped(0.0));
        Insight {
            role: role.clone(),
            summary: line.summary,
            findings: line.findings,
            confidence,
            payload: line.payload,
        }
    });

    let message = if parsed.message.is_empty() {
        insight
            .as_ref()
            .map(|i| i.summary.clone())
            .unwrap_or_default()
    } else {
        parsed.message
    };

    Some(RoleUpdate {
        phase: parsed.phase,
        message,
        confidence: parsed.confidence,
        payload: parsed.payload,
        insight,
    })
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
