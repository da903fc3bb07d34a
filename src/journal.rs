//! JSONL journal of a decision's event stream.
//!
//! The journal is just another subscriber: it replays the log from the start
//! and follows it to the end, writing one line per event with an ISO 8601
//! timestamp at microsecond precision.

use crate::domain::{DecisionEvent, DecisionId};
use crate::event_store::EventLog;
use anyhow::{Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;

/// One event in JSONL form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    pub decision_id: String,
    pub role: String,
    pub phase: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl From<&DecisionEvent> for JournalEntry {
    fn from(event: &DecisionEvent) -> Self {
        Self {
            seq: event.sequence,
            ts: event.created_at.0.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            decision_id: event.decision_id.to_string(),
            role: event.role.to_string(),
            phase: event.phase.to_string(),
            message: event.message.clone(),
            confidence: event.confidence.map(f64::from),
            payload: event.payload.clone().map(Value::Object),
        }
    }
}

/// Final line written when the decision failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRecord {
    pub terminal: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JournalLine {
    Event(JournalEntry),
    Terminal(TerminalRecord),
}

pub struct EventJournal;

impl EventJournal {
    /// Path of the journal file for `decision_id` under `dir`.
    pub fn path_for(dir: &Path, decision_id: &DecisionId) -> PathBuf {
        dir.join(format!("{}.jsonl", decision_id))
    }

    /// Subscribes now and writes the stream in the background.
    ///
    /// Resolves to the number of lines written once the decision finishes.
    pub fn spawn(
        log: Arc<dyn EventLog>,
        decision_id: DecisionId,
        dir: &Path,
    ) -> JoinHandle<Result<usize>> {
        let subscription = log.subscribe(&decision_id);
        let path = Self::path_for(dir, &decision_id);
        let dir = dir.to_path_buf();

        tokio::spawn(async move {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create journal dir {}", dir.display()))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .with_context(|| format!("Failed to open journal {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            let mut lines = 0usize;

            let mut subscription = subscription;
            while let Some(item) = subscription.next().await {
                let line = match item {
                    Ok(event) => JournalLine::Event(JournalEntry::from(&event)),
                    Err(failure) => JournalLine::Terminal(TerminalRecord {
                        terminal: "failed".to_string(),
                        reason: failure.reason,
                    }),
                };
                let mut json = serde_json::to_string(&line).context("Failed to encode journal line")?;
                json.push('\n');
                writer
                    .write_all(json.as_bytes())
                    .await
                    .with_context(|| format!("Failed to write journal {}", path.display()))?;
                writer.flush().await?;
                lines += 1;
            }

            tracing::debug!(decision_id = %decision_id, path = %path.display(), lines, "Journal closed");
            Ok(lines)
        })
    }
}

/// Reads a journal back, line by line.
pub fn read_journal(path: &Path) -> Result<Vec<JournalLine>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read journal {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid journal line {} in {}", i + 1, path.display()))
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/journal_tests.rs"]
mod tests;
