//! Bounded repair rounds over one document directory
//!
//! Each round writes candidate overrides to the pattern file under a fresh
//! run id, runs the gates, re-validates, and either commits or restores the
//! pattern file byte-for-byte. Rounds against one pattern file are strictly
//! sequential.

use serde::Serialize;
use shared_types::{Finding, Mutation, Report, Summary};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validation_engine::{
    timestamp, write_failure_reports, write_summary, Spec, ValidationEngine, ValidationError,
    ValidationOptions,
};

use crate::config::AutofixConfig;
use crate::error::AutofixError;
use crate::executor::SafeFileExecutor;
use crate::extraction::{extract_batch, source_files, ExtractionService};
use crate::mutator::{load_mutation_batch, PatternMutator};
use crate::quality::{CommandQualityGate, QualityGate};
use crate::regression::RegressionRunner;
use crate::suggest::{dedup_by_id, suggest_mutations, MutationSuggester};

/// Appended to reports still repairable when the round budget runs out
pub const MAX_ROUNDS_EXCEEDED: &str = "MAX_ROUNDS_EXCEEDED";

/// Subdirectory of the work dir holding per-round extractions
pub const ROUNDS_DIR: &str = "rounds";

/// `true` when the new summary has fewer repairable failures or more
/// passes. A tie is not an improvement.
pub fn is_improvement(before: &Summary, after: &Summary) -> bool {
    after.fail_llm < before.fail_llm || after.pass > before.pass
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RollbackReason {
    /// Command that exited non-zero
    QualityCheckFailed(String),
    /// Number of failed regression cases
    RegressionFailed(usize),
    NoImprovement,
    DryRun,
    /// Rejected mutation, disallowed path, I/O
    Operational(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RoundOutcome {
    Committed,
    RolledBack(RollbackReason),
}

impl RoundOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, RoundOutcome::Committed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: usize,
    pub run_id: String,
    pub candidates: Vec<Mutation>,
    pub outcome: RoundOutcome,
    /// Files a rollback could not put back because their backup was gone
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unrestored: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No report is FAIL_LLM
    NothingToRepair,
    /// No source produced a new candidate
    NoCandidates,
    /// The last round was rolled back
    RoundRejected,
    /// Every round in the budget committed
    RoundLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutofixOutcome {
    pub rounds: Vec<RoundRecord>,
    pub summary: Summary,
    pub reports: Vec<Report>,
    pub stop_reason: StopReason,
    /// Directory the final reports describe
    pub work_dir: PathBuf,
}

impl AutofixOutcome {
    pub fn committed_rounds(&self) -> usize {
        self.rounds.iter().filter(|r| r.outcome.is_committed()).count()
    }

    /// Write the summary and per-document failure reports into `work_dir`
    pub fn persist(&self) -> Result<PathBuf, ValidationError> {
        write_failure_reports(&self.work_dir, &self.reports)?;
        write_summary(&self.work_dir, &self.summary)
    }
}

enum Verdict {
    Improved {
        summary: Summary,
        reports: Vec<Report>,
        dir: PathBuf,
    },
    Rejected(RollbackReason),
}

pub struct AutofixOrchestrator<'a> {
    config: AutofixConfig,
    engine: ValidationEngine<'a>,
    executor: SafeFileExecutor,
    suggester: Option<Arc<dyn MutationSuggester>>,
    extractor: Option<Arc<dyn ExtractionService>>,
    quality: Option<Arc<dyn QualityGate>>,
}

impl<'a> AutofixOrchestrator<'a> {
    /// The executor is confined to the configured allowed roots. A command
    /// quality gate is installed when the config lists commands.
    pub fn new(
        spec: &'a Spec,
        options: ValidationOptions,
        config: AutofixConfig,
    ) -> Result<Self, AutofixError> {
        let executor = SafeFileExecutor::new(config.allowed_roots(), &config.paths.backup_root)?;
        let commands = config.quality_commands();
        let quality: Option<Arc<dyn QualityGate>> = if commands.is_empty() {
            None
        } else {
            Some(Arc::new(CommandQualityGate::new(
                commands.to_vec(),
                config.project_root(),
            )))
        };
        Ok(Self {
            engine: ValidationEngine::new(spec, options),
            executor,
            suggester: None,
            extractor: None,
            quality,
            config,
        })
    }

    pub fn with_suggester(mut self, suggester: Arc<dyn MutationSuggester>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    /// Used for per-round re-extraction and the regression gate
    pub fn with_extractor(mut self, extractor: Arc<dyn ExtractionService>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_quality_gate(mut self, gate: Arc<dyn QualityGate>) -> Self {
        self.quality = Some(gate);
        self
    }

    pub fn config(&self) -> &AutofixConfig {
        &self.config
    }

    pub fn executor(&self) -> &SafeFileExecutor {
        &self.executor
    }

    #[instrument(skip(self), fields(work_dir = %self.config.paths.work_dir.display(), max_rounds = self.config.max_rounds))]
    pub async fn run(&self) -> Result<AutofixOutcome, AutofixError> {
        let mut work_dir = self.config.paths.work_dir.clone();
        let (mut summary, mut reports) = self.engine.validate_directory(&work_dir)?;
        info!(
            total = summary.total,
            pass = summary.pass,
            fail_llm = summary.fail_llm,
            "Baseline computed"
        );

        let mut rounds = Vec::new();
        let mut stop_reason = StopReason::RoundLimit;
        for round in 1..=self.config.max_rounds {
            if summary.fail_llm == 0 {
                debug!("Nothing repairable left");
                stop_reason = StopReason::NothingToRepair;
                break;
            }
            let candidates = self.collect_candidates(&reports).await?;
            if candidates.is_empty() {
                info!(round, "No candidate mutations, stopping");
                stop_reason = StopReason::NoCandidates;
                break;
            }

            let run_id = self.executor.create_run_id();
            info!(round, run_id = %run_id, candidates = candidates.len(), "Starting round");
            let verdict = match self.attempt_round(&run_id, &candidates, &work_dir, &summary).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(round, run_id = %run_id, "Round failed: {}", e);
                    Verdict::Rejected(RollbackReason::Operational(e.to_string()))
                }
            };

            match verdict {
                Verdict::Improved {
                    summary: next_summary,
                    reports: next_reports,
                    dir,
                } => {
                    info!(
                        round,
                        run_id = %run_id,
                        pass = next_summary.pass,
                        fail_llm = next_summary.fail_llm,
                        "Round committed"
                    );
                    summary = next_summary;
                    reports = next_reports;
                    work_dir = dir;
                    rounds.push(RoundRecord {
                        round,
                        run_id,
                        candidates,
                        outcome: RoundOutcome::Committed,
                        unrestored: Vec::new(),
                    });
                }
                Verdict::Rejected(reason) => {
                    let restore = self.executor.restore(&run_id)?;
                    self.discard_round_dir(&run_id);
                    if restore.is_complete() {
                        warn!(round, run_id = %run_id, restored = restore.restored, reason = ?reason, "Round rolled back");
                    } else {
                        warn!(
                            round,
                            run_id = %run_id,
                            missing = restore.missing.len(),
                            reason = ?reason,
                            "Round partially rolled back"
                        );
                    }
                    rounds.push(RoundRecord {
                        round,
                        run_id,
                        candidates,
                        outcome: RoundOutcome::RolledBack(reason),
                        unrestored: restore.missing,
                    });
                    stop_reason = StopReason::RoundRejected;
                    break;
                }
            }
        }

        let budget_spent = self.config.max_rounds > 0 && rounds.len() == self.config.max_rounds;
        if budget_spent && !self.config.dry_run {
            let escalated = escalate_remaining(&mut reports, self.config.max_rounds);
            if escalated > 0 {
                summary = Summary::from_reports(
                    summary.spec_version.clone(),
                    summary.dir.clone(),
                    timestamp(),
                    &reports,
                );
            }
        }

        Ok(AutofixOutcome {
            rounds,
            summary,
            reports,
            stop_reason,
            work_dir,
        })
    }

    /// Batch file plus suggestions, minus ids the pattern file already has
    async fn collect_candidates(&self, reports: &[Report]) -> Result<Vec<Mutation>, AutofixError> {
        let mut candidates = Vec::new();
        if let Some(path) = &self.config.paths.mutations_file {
            candidates.extend(load_mutation_batch(path)?);
        }

        let llm = &self.config.llm;
        if let (true, Some(suggester)) = (llm.enabled, &self.suggester) {
            match suggest_mutations(
                suggester.as_ref(),
                reports,
                llm.max_cases,
                llm.max_mutations,
                llm.preview_len,
            )
            .await
            {
                Ok(suggested) => candidates.extend(suggested),
                Err(e) => warn!("Suggestion collaborator failed: {}", e),
            }
        }

        let current = PatternMutator::load(&self.config.paths.patterns_file)?;
        candidates.retain(|m| {
            let fresh = !current.config().has_override_id(&m.id);
            if !fresh {
                debug!(id = %m.id, "Override already present, skipping candidate");
            }
            fresh
        });
        Ok(dedup_by_id(candidates, self.config.max_mutations))
    }

    async fn attempt_round(
        &self,
        run_id: &str,
        candidates: &[Mutation],
        work_dir: &Path,
        baseline: &Summary,
    ) -> Result<Verdict, AutofixError> {
        let mut mutator = PatternMutator::load(&self.config.paths.patterns_file)?;
        mutator.apply_all(candidates)?;
        self.executor
            .apply_json(mutator.path(), mutator.config(), run_id)?;

        if let Some(gate) = &self.quality {
            let report = gate.check().await?;
            if let Some(command) = report.failed_command {
                return Ok(Verdict::Rejected(RollbackReason::QualityCheckFailed(command)));
            }
        }

        if let Some(samples_dir) = &self.config.regression.samples_dir {
            match &self.extractor {
                Some(extractor) => {
                    let mut runner = RegressionRunner::new(samples_dir)
                        .with_workers(self.config.regression.workers);
                    if let Some(output_dir) = &self.config.regression.output_dir {
                        runner = runner.with_output_dir(output_dir);
                    }
                    let result = runner.run(extractor.as_ref()).await?;
                    if result.has_failures() {
                        return Ok(Verdict::Rejected(RollbackReason::RegressionFailed(
                            result.failed,
                        )));
                    }
                }
                None => warn!("Regression samples configured without an extractor, skipping gate"),
            }
        }

        let dir = match self.extract_round(run_id).await? {
            Some(dir) => dir,
            None => work_dir.to_path_buf(),
        };
        let (summary, reports) = self.engine.validate_directory(&dir)?;

        if self.config.dry_run {
            return Ok(Verdict::Rejected(RollbackReason::DryRun));
        }
        if summary.total < baseline.total || !is_improvement(baseline, &summary) {
            return Ok(Verdict::Rejected(RollbackReason::NoImprovement));
        }
        Ok(Verdict::Improved {
            summary,
            reports,
            dir,
        })
    }

    fn round_dir(&self, run_id: &str) -> PathBuf {
        self.config.paths.work_dir.join(ROUNDS_DIR).join(run_id)
    }

    /// Re-extract every source into the round directory. `None` when no
    /// extractor or source directory is configured. Any failed source fails
    /// the round.
    async fn extract_round(&self, run_id: &str) -> Result<Option<PathBuf>, AutofixError> {
        let (Some(extractor), Some(source_dir)) = (&self.extractor, &self.config.paths.source_dir)
        else {
            return Ok(None);
        };
        let sources = source_files(source_dir)?;
        let dir = self.round_dir(run_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| AutofixError::Io {
                path: dir.clone(),
                source,
            })?;
        let outcome = extract_batch(
            extractor.as_ref(),
            &sources,
            &dir,
            self.config.regression.workers,
        )
        .await;
        let mut failed = 0;
        for (name, result) in &outcome {
            if let Err(e) = result {
                warn!(file = %name, "Re-extraction failed: {}", e);
                failed += 1;
            }
        }
        // A partial round would drop failing documents from the counts
        if failed > 0 {
            return Err(AutofixError::IncompleteExtraction {
                failed,
                total: sources.len(),
            });
        }
        Ok(Some(dir))
    }

    fn discard_round_dir(&self, run_id: &str) {
        let dir = self.round_dir(run_id);
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), "Failed to remove round directory: {}", e);
            }
        }
    }
}

/// Move every still-repairable report to FAIL_HUMAN. Returns how many moved.
pub fn escalate_remaining(reports: &mut [Report], max_rounds: usize) -> usize {
    let mut escalated = 0;
    for report in reports.iter_mut() {
        let finding = Finding::new(
            MAX_ROUNDS_EXCEEDED,
            None,
            format!("still failing after {max_rounds} automated repair round(s)"),
        );
        if report.escalate(finding) {
            info!(file = %report.context.json_filename, "Escalated to human review");
            escalated += 1;
        }
    }
    escalated
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared_types::{ReportContext, ReportStatus};
    use std::collections::BTreeMap;

    fn summary(pass: usize, fail_llm: usize, fail_human: usize) -> Summary {
        Summary {
            spec_version: None,
            dir: "d".to_string(),
            total: pass + fail_llm + fail_human,
            pass,
            fail_human,
            fail_llm,
            errors_by_code: BTreeMap::new(),
            generated_at: String::new(),
        }
    }

    #[test]
    fn test_improvement_predicate() {
        assert!(is_improvement(&summary(1, 2, 0), &summary(1, 1, 1)));
        assert!(is_improvement(&summary(1, 2, 0), &summary(2, 2, 0)));
        assert!(!is_improvement(&summary(1, 2, 0), &summary(1, 2, 0)));
        assert!(!is_improvement(&summary(1, 2, 0), &summary(0, 3, 0)));
    }

    #[test]
    fn test_escalation_only_touches_repairable_reports() {
        let report = |status| Report {
            status,
            document_type: "bank_receipt".to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
            context: ReportContext {
                pdf_filename: None,
                json_filename: "a_extracted_revised.json".to_string(),
                extracted_text_preview: String::new(),
            },
            spec_version: None,
        };
        let mut reports = vec![
            report(ReportStatus::Pass),
            report(ReportStatus::FailLlm),
            report(ReportStatus::FailHuman),
        ];
        assert_eq!(escalate_remaining(&mut reports, 2), 1);
        assert_eq!(reports[1].status, ReportStatus::FailHuman);
        assert_eq!(reports[1].errors[0].code, MAX_ROUNDS_EXCEEDED);
        assert!(reports[2].errors.is_empty());
        assert_eq!(reports[0].status, ReportStatus::Pass);
    }

    #[test]
    fn test_round_outcome_serializes_with_reason() {
        let outcome = RoundOutcome::RolledBack(RollbackReason::QualityCheckFailed("mypy".into()));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "status": "rolled_back",
                "reason": {"kind": "quality_check_failed", "detail": "mypy"}
            })
        );
    }
}
