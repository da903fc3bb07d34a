use super::*;
use crate::aggregator::InsightSnapshot;
use crate::domain::{Confidence, DecisionId, DecisionRequest, Insight, PersonaContext, Phase, RoleId};
use std::sync::Arc;

fn input() -> RoleInput {
    RoleInput {
        decision_id: DecisionId::from("proc-1"),
        request: Arc::new(DecisionRequest::new("open a second store", "retail")),
        context: Arc::new(PersonaContext::default()),
        prior_insights: InsightSnapshot::new(),
    }
}

fn shell(id: &str, script: &str) -> ProcessRole {
    ProcessRole::new(id, "sh").with_args(vec!["-c".to_string(), script.to_string()])
}

async fn collect(role: &ProcessRole) -> Vec<Result<RoleUpdate, RoleError>> {
    role.analyze(input()).collect().await
}

#[cfg(unix)]
#[tokio::test]
async fn test_jsonl_output_becomes_updates() {
    let role = shell(
        "market",
        r#"echo '{"phase":"analyzing","message":"sizing market"}'
echo 'plain progress'
echo '{"phase":"completed","insight":{"summary":"viable","confidence":0.8}}'"#,
    );
    let items = collect(&role).await;
    assert_eq!(items.len(), 3);

    let updates: Vec<RoleUpdate> = items.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(updates[0].message, "sizing market");
    assert_eq!(updates[1].phase, Phase::Analyzing);
    assert_eq!(updates[1].message, "plain progress");
    assert_eq!(updates[2].phase, Phase::Completed);
    let insight = updates[2].insight.as_ref().unwrap();
    assert_eq!(insight.role.as_str(), "market");
    assert_eq!(insight.summary, "viable");
}

#[cfg(unix)]
#[tokio::test]
async fn test_role_input_is_written_to_stdin() {
    let role = shell("echo", "head -n 1");
    let items = collect(&role).await;
    assert_eq!(items.len(), 1);
    let update = items.into_iter().next().unwrap().unwrap();
    let echoed: serde_json::Value = serde_json::from_str(&update.message).unwrap();
    assert_eq!(echoed["decision_id"], "proc-1");
    assert_eq!(echoed["request"]["prompt"], "open a second store");
}

#[cfg(unix)]
#[tokio::test]
async fn test_stdin_document_carries_context_and_prior_insights() {
    let mut prior = InsightSnapshot::new();
    prior.insert(
        RoleId::from("framing"),
        Insight::new(RoleId::from("framing"), "worth a look", Confidence::from(0.5)),
    );
    let input = RoleInput {
        decision_id: DecisionId::from("proc-2"),
        request: Arc::new(DecisionRequest::new("lease the corner unit", "retail")),
        context: Arc::new(PersonaContext {
            key: "retail".to_string(),
            description: "Regional chain".to_string(),
            assumptions: vec!["two stores".to_string()],
            ..PersonaContext::default()
        }),
        prior_insights: prior,
    };

    let role = shell("market", "head -n 1");
    let items: Vec<_> = role.analyze(input).collect().await;
    let update = items.into_iter().next().unwrap().unwrap();
    let doc: serde_json::Value = serde_json::from_str(&update.message).unwrap();

    assert_eq!(doc["decision_id"], "proc-2");
    assert_eq!(doc["request"]["persona"], "retail");
    assert_eq!(doc["context"]["key"], "retail");
    assert_eq!(doc["context"]["description"], "Regional chain");
    assert_eq!(doc["context"]["assumptions"][0], "two stores");
    assert_eq!(doc["prior_insights"]["framing"]["summary"], "worth a look");
    assert_eq!(doc["prior_insights"]["framing"]["confidence"], 0.5);
}

#[cfg(unix)]
#[tokio::test]
async fn test_role_id_is_exported_to_process() {
    let role = shell("finance", r#"echo "$DECISION_ENGINE_ROLE""#);
    let items = collect(&role).await;
    assert_eq!(items[0].as_ref().unwrap().message, "finance");
}

#[cfg(unix)]
#[tokio::test]
async fn test_nonzero_exit_reports_last_stderr_line() {
    let role = shell(
        "risk",
        "echo '{\"phase\":\"analyzing\",\"message\":\"working\"}'; echo 'first' >&2; echo 'quota exhausted' >&2; exit 3",
    );
    let items = collect(&role).await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    let err = items[1].as_ref().unwrap_err();
    assert!(err.message.contains("quota exhausted"), "got: {}", err);
    assert!(err.message.contains("exit status: 3"), "got: {}", err);
}

#[tokio::test]
async fn test_missing_command_is_a_role_error() {
    let role = ProcessRole::new("ghost", "/definitely/not/a/real/binary");
    let items = collect(&role).await;
    assert_eq!(items.len(), 1);
    let err = items[0].as_ref().unwrap_err();
    assert!(err.message.contains("Failed to spawn"), "got: {}", err);
}

#[cfg(unix)]
#[tokio::test]
async fn test_working_dir_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
    let role = shell("fs", "cat marker.txt").with_working_dir(dir.path().to_path_buf());
    let items = collect(&role).await;
    assert_eq!(items[0].as_ref().unwrap().message, "here");
}
