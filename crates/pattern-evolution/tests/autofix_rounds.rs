//! End-to-end autofix rounds against a throwaway project

mod common;

use common::{
    payer_fix, BrokenExtractor, FailingGate, Fixture, OverrideAwareExtractor, ScriptedSuggester, CLEAN_PAYER,
    PAYER_OVERRIDE_ID,
};
use pattern_evolution::config::AutofixConfig;
use pattern_evolution::{
    AutofixOrchestrator, AutofixOutcome, RollbackReason, RoundOutcome, StopReason,
    MAX_ROUNDS_EXCEEDED,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use shared_types::{Mutation, ReportStatus};
use std::fs;
use std::sync::Arc;
use validation_engine::{ValidationEngine, SUMMARY_FILE};

async fn run(config: AutofixConfig) -> AutofixOutcome {
    let spec = common::spec();
    AutofixOrchestrator::new(&spec, common::options(), config)
        .unwrap()
        .run()
        .await
        .unwrap()
}

fn rolled_back(outcome: &AutofixOutcome) -> &RollbackReason {
    match &outcome.rounds[0].outcome {
        RoundOutcome::RolledBack(reason) => reason,
        RoundOutcome::Committed => panic!("round unexpectedly committed"),
    }
}

fn baseline(fixture: &Fixture) -> shared_types::Summary {
    let spec = common::spec();
    let engine = ValidationEngine::new(&spec, common::options());
    engine.validate_directory(&fixture.docs_dir()).unwrap().0
}

// ============================================================================
// Gates
// ============================================================================

#[tokio::test]
async fn test_quality_gate_failure_restores_patterns() {
    let fixture = Fixture::new();
    let before = fixture.patterns_bytes();
    let mut config = fixture.config();
    config.max_rounds = 3;
    config.paths.mutations_file = Some(fixture.write_mutations(&[payer_fix()]));

    let spec = common::spec();
    let outcome = AutofixOrchestrator::new(&spec, common::options(), config)
        .unwrap()
        .with_quality_gate(Arc::new(FailingGate))
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.rounds.len(), 1);
    assert_eq!(
        rolled_back(&outcome),
        &RollbackReason::QualityCheckFailed("mypy src".to_string())
    );
    assert_eq!(outcome.stop_reason, StopReason::RoundRejected);
    assert!(outcome.rounds[0].unrestored.is_empty());
    assert_eq!(fixture.patterns_bytes(), before);
    assert_eq!(outcome.summary.fail_llm, 2);
}

#[tokio::test]
async fn test_regression_failure_restores_patterns() {
    let fixture = Fixture::new();
    let before = fixture.patterns_bytes();
    let samples = fixture.path("samples");
    fs::create_dir_all(&samples).unwrap();
    fs::write(samples.join("s1.pdf"), b"%PDF-1.4").unwrap();
    fs::write(
        samples.join("s1_truth.json"),
        serde_json::to_string(&json!({"payer": "上海嘉静门诊部有限公司"})).unwrap(),
    )
    .unwrap();

    let mut config = fixture.config();
    config.max_rounds = 2;
    config.paths.mutations_file = Some(fixture.write_mutations(&[payer_fix()]));
    config.regression.samples_dir = Some(samples.clone());

    let spec = common::spec();
    let extractor = Arc::new(OverrideAwareExtractor::new(fixture.patterns_file()));
    let outcome = AutofixOrchestrator::new(&spec, common::options(), config)
        .unwrap()
        .with_extractor(extractor.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(rolled_back(&outcome), &RollbackReason::RegressionFailed(1));
    assert_eq!(fixture.patterns_bytes(), before);
    assert_eq!(extractor.calls(), 1);
    assert!(samples.join("regression_outputs/s1_extracted_revised.json").exists());
}

// ============================================================================
// Improvement gating
// ============================================================================

#[tokio::test]
async fn test_non_improving_round_leaves_state_untouched() {
    let fixture = Fixture::new();
    let before = fixture.patterns_bytes();
    let start = baseline(&fixture);
    let mut config = fixture.config();
    config.max_rounds = 2;
    config.paths.mutations_file = Some(fixture.write_mutations(&[payer_fix()]));

    let outcome = run(config).await;

    assert_eq!(rolled_back(&outcome), &RollbackReason::NoImprovement);
    assert_eq!(fixture.patterns_bytes(), before);
    assert!(outcome.summary.same_counts(&start));
    assert!(!fixture.docs_dir().join(SUMMARY_FILE).exists());
    assert_eq!(outcome.work_dir, fixture.docs_dir());
}

#[tokio::test]
async fn test_improving_round_commits_suggested_override() {
    let fixture = Fixture::new();
    fixture.add_sources(&["a", "b"]);
    let mut config = fixture.config();
    config.max_rounds = 2;
    config.llm.enabled = true;
    config.paths.source_dir = Some(fixture.path("sources"));

    let reply = format!(
        "Suggested rules:\n```json\n{}\n```",
        serde_json::to_string(&vec![payer_fix(), payer_fix()]).unwrap()
    );
    let suggester = Arc::new(ScriptedSuggester::new(reply));
    let extractor = Arc::new(OverrideAwareExtractor::new(fixture.patterns_file()));

    let spec = common::spec();
    let outcome = AutofixOrchestrator::new(&spec, common::options(), config)
        .unwrap()
        .with_suggester(suggester.clone())
        .with_extractor(extractor.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.rounds.len(), 1);
    assert_eq!(outcome.rounds[0].outcome, RoundOutcome::Committed);
    assert_eq!(outcome.rounds[0].candidates, vec![payer_fix()]);
    assert_eq!(outcome.stop_reason, StopReason::NothingToRepair);
    assert_eq!(outcome.summary.pass, 2);
    assert_eq!(outcome.summary.fail_llm, 0);
    assert_eq!(outcome.committed_rounds(), 1);

    let patterns = fixture.patterns();
    assert!(patterns.has_override_id(PAYER_OVERRIDE_ID));
    assert_eq!(patterns.extra.get("version"), Some(&json!(3)));

    // The prompt only shows repairable cases
    assert_eq!(suggester.calls(), 1);
    let prompts = suggester.prompts.lock().unwrap();
    let payload: serde_json::Value = serde_json::from_str(&prompts[0][1].content).unwrap();
    assert_eq!(payload["cases"].as_array().unwrap().len(), 2);
    drop(prompts);

    assert_eq!(extractor.calls(), 2);
    assert!(outcome.work_dir.starts_with(fixture.docs_dir().join("rounds")));
    let doc: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(outcome.work_dir.join("a_extracted_revised.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(doc["payer"], json!(CLEAN_PAYER));

    let summary_path = outcome.persist().unwrap();
    assert_eq!(summary_path, outcome.work_dir.join(SUMMARY_FILE));
}

#[tokio::test]
async fn test_dry_run_always_restores() {
    let fixture = Fixture::new();
    fixture.add_sources(&["a", "b"]);
    let before = fixture.patterns_bytes();
    let mut config = fixture.config();
    config.dry_run = true;
    config.paths.source_dir = Some(fixture.path("sources"));
    config.paths.mutations_file = Some(fixture.write_mutations(&[payer_fix()]));

    let spec = common::spec();
    let outcome = AutofixOrchestrator::new(&spec, common::options(), config)
        .unwrap()
        .with_extractor(Arc::new(OverrideAwareExtractor::new(fixture.patterns_file())))
        .run()
        .await
        .unwrap();

    assert_eq!(rolled_back(&outcome), &RollbackReason::DryRun);
    assert_eq!(fixture.patterns_bytes(), before);
    assert_eq!(outcome.work_dir, fixture.docs_dir());
    assert!(!fixture
        .docs_dir()
        .join("rounds")
        .join(&outcome.rounds[0].run_id)
        .exists());
    // Dry runs never escalate
    assert_eq!(outcome.summary.fail_llm, 2);
}

// ============================================================================
// Operational failures and escalation
// ============================================================================

#[tokio::test]
async fn test_invalid_regex_is_an_operational_rollback() {
    let fixture = Fixture::new();
    let before = fixture.patterns_bytes();
    let mut config = fixture.config();
    config.max_rounds = 2;
    let broken = Mutation::append_override("common", "payer", "付款人(", "broken", 1);
    config.paths.mutations_file = Some(fixture.write_mutations(&[broken]));

    let outcome = run(config).await;

    assert!(matches!(rolled_back(&outcome), RollbackReason::Operational(msg) if msg.contains("broken")));
    assert_eq!(fixture.patterns_bytes(), before);
}

#[tokio::test]
async fn test_failed_re_extraction_is_an_operational_rollback() {
    let fixture = Fixture::new();
    fixture.add_sources(&["a", "b"]);
    let before = fixture.patterns_bytes();
    let mut config = fixture.config();
    config.max_rounds = 2;
    config.paths.source_dir = Some(fixture.path("sources"));
    config.paths.mutations_file = Some(fixture.write_mutations(&[payer_fix()]));

    let spec = common::spec();
    let outcome = AutofixOrchestrator::new(&spec, common::options(), config)
        .unwrap()
        .with_extractor(Arc::new(BrokenExtractor))
        .run()
        .await
        .unwrap();

    assert!(matches!(
        rolled_back(&outcome),
        RollbackReason::Operational(msg) if msg.contains("2 of 2")
    ));
    assert_eq!(outcome.committed_rounds(), 0);
    assert_eq!(fixture.patterns_bytes(), before);
    assert_eq!(outcome.summary.total, 2);
    assert_eq!(outcome.summary.fail_llm, 2);
    assert_eq!(outcome.work_dir, fixture.docs_dir());
    assert!(!fixture
        .docs_dir()
        .join("rounds")
        .join(&outcome.rounds[0].run_id)
        .exists());
}

#[tokio::test]
async fn test_pattern_file_outside_allowed_roots_is_rejected() {
    let fixture = Fixture::new();
    let before = fixture.patterns_bytes();
    let mut config = fixture.config();
    config.max_rounds = 2;
    config.paths.allowed_roots = vec![fixture.path("sources")];
    config.paths.mutations_file = Some(fixture.write_mutations(&[payer_fix()]));

    let outcome = run(config).await;

    assert!(matches!(rolled_back(&outcome), RollbackReason::Operational(_)));
    assert_eq!(fixture.patterns_bytes(), before);
}

#[tokio::test]
async fn test_exhausted_budget_escalates_remaining_failures() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.paths.mutations_file = Some(fixture.write_mutations(&[payer_fix()]));

    let outcome = run(config).await;

    assert_eq!(outcome.rounds.len(), 1);
    assert_eq!(outcome.summary.fail_llm, 0);
    assert_eq!(outcome.summary.fail_human, 2);
    assert_eq!(outcome.summary.errors_by_code.get(MAX_ROUNDS_EXCEEDED), Some(&2));
    for report in &outcome.reports {
        assert_eq!(report.status, ReportStatus::FailHuman);
        assert!(report.has_error(MAX_ROUNDS_EXCEEDED));
    }
}

#[tokio::test]
async fn test_existing_override_ids_are_not_candidates() {
    let fixture = Fixture::new();
    fixture.write_patterns(&json!({
        "field_patterns_overrides": {
            "common": {"payer": [{"id": PAYER_OVERRIDE_ID, "regex": "x", "priority": 1}]}
        }
    }));
    let before = fixture.patterns_bytes();
    let mut config = fixture.config();
    config.paths.mutations_file = Some(fixture.write_mutations(&[payer_fix()]));

    let outcome = run(config).await;

    assert!(outcome.rounds.is_empty());
    assert_eq!(outcome.stop_reason, StopReason::NoCandidates);
    assert_eq!(fixture.patterns_bytes(), before);
    assert_eq!(outcome.summary.fail_llm, 2);
}

#[tokio::test]
async fn test_unparseable_suggestion_means_no_candidates() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.llm.enabled = true;

    let spec = common::spec();
    let suggester = Arc::new(ScriptedSuggester::new("I cannot help with that."));
    let outcome = AutofixOrchestrator::new(&spec, common::options(), config)
        .unwrap()
        .with_suggester(suggester.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(suggester.calls(), 1);
    assert!(outcome.rounds.is_empty());
    assert_eq!(outcome.stop_reason, StopReason::NoCandidates);
}
