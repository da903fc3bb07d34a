use super::*;

fn role() -> RoleId {
    RoleId::from("market")
}

#[test]
fn test_progress_line() {
    let update = parse_role_line(
        &role(),
        r#"{"phase":"analyzing","message":"reading data","confidence":0.4}"#,
    )
    .unwrap();
    assert_eq!(update.phase, Phase::Analyzing);
    assert_eq!(update.message, "reading data");
    assert_eq!(update.confidence.map(|c| c.value()), Some(0.4));
    assert!(update.insight.is_none());
}

#[test]
fn test_completed_line_stamps_role_on_insight() {
    let line = r#"{"phase":"completed","insight":{"summary":"expand","findings":["demand is high"],"confidence":1.7}}"#;
    let update = parse_role_line(&role(), line).unwrap();
    assert_eq!(update.phase, Phase::Completed);
    assert_eq!(update.message, "expand");

    let insight = update.insight.unwrap();
    assert_eq!(insight.role, role());
    assert_eq!(insight.findings, vec!["demand is high".to_string()]);
    assert_eq!(insight.confidence.value(), 1.0);
}

#[test]
fn test_insight_confidence_falls_back_to_line_confidence() {
    let line = r#"{"phase":"completed","message":"done","confidence":0.6,"insight":{"summary":"ok"}}"#;
    let update = parse_role_line(&role(), line).unwrap();
    assert_eq!(update.insight.unwrap().confidence.value(), 0.6);
}

#[test]
fn test_payload_is_kept() {
    let line = r#"{"phase":"reporting","message":"table","payload":{"rows":3}}"#;
    let update = parse_role_line(&role(), line).unwrap();
    assert_eq!(update.phase, Phase::Reporting);
    assert_eq!(update.payload.unwrap()["rows"], serde_json::json!(3));
}

#[test]
fn test_plain_text_becomes_progress() {
    let update = parse_role_line(&role(), "  thinking about pricing  ").unwrap();
    assert_eq!(update.phase, Phase::Analyzing);
    assert_eq!(update.message, "thinking about pricing");
}

#[test]
fn test_unknown_phase_is_treated_as_text() {
    let line = r#"{"phase":"dreaming","message":"x"}"#;
    let update = parse_role_line(&role(), line).unwrap();
    assert_eq!(update.phase, Phase::Analyzing);
    assert_eq!(update.message, line);
}

#[test]
fn test_blank_line_is_skipped() {
    assert!(parse_role_line(&role(), "   ").is_none());
}
