//! Shared fixtures for autofix integration tests
//!
//! A `Fixture` is a throwaway project: `config/patterns.json`, a `docs/`
//! directory of extracted documents, `sources/` for re-extraction and
//! `backups/` for the executor.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use pattern_evolution::config::{
    AutofixConfig, LlmConfig, PathsConfig, QualityConfig, RegressionConfig,
};
use pattern_evolution::{
    AutofixError, ExtractionError, ExtractionService, MutationSuggester, QualityGate,
    QualityReport, SuggestionError,
};
use serde_json::{json, Value};
use shared_types::{Mutation, PatternConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use validation_engine::{ChatMessage, Spec, ValidationOptions};

pub const CLEAN_PAYER: &str = "北京磐沄科技有限公司";
pub const SPACED_PAYER: &str = "北京 磐沄科技有限公司";
pub const PAYER_OVERRIDE_ID: &str = "payer_no_space";

/// Route round logs to the test harness; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn spec() -> Spec {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../validation-engine/tests/fixtures/invoice_spec.json");
    Spec::from_file(path).expect("fixture spec loads")
}

pub fn options() -> ValidationOptions {
    ValidationOptions::new(NaiveDate::from_ymd_opt(2026, 2, 11).unwrap())
}

pub fn bank_receipt(payer: &str) -> Value {
    json!({
        "document_type": "bank_receipt",
        "extracted_text": "客户回单 付款人：北京磐沄科技有限公司",
        "payer": payer,
        "payee": "收款方（上海 分部）",
        "date": "2026-02-05",
        "currency": "CNY",
        "uid": "ABCDEFGH12345678",
        "amount": "1.00",
        "direction": "out"
    })
}

pub fn payer_fix() -> Mutation {
    Mutation::append_override(
        "common",
        "payer",
        r"付款人[:：]\s*(\S+)",
        PAYER_OVERRIDE_ID,
        500,
    )
}

pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    /// Empty pattern file and two repairable receipts in `docs/`
    pub fn new() -> Self {
        init_tracing();
        let root = tempfile::tempdir().unwrap();
        for dir in ["config", "docs", "sources", "backups"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        let fixture = Self { root };
        fixture.write_patterns(&json!({
            "doc_patterns": {"bank_receipt": ["客户回单"]},
            "field_patterns": {"payer": ["付款人[:：](.+)"]},
            "field_patterns_overrides": {},
            "version": 3
        }));
        fixture.write_doc("a", &bank_receipt(SPACED_PAYER));
        fixture.write_doc("b", &bank_receipt(SPACED_PAYER));
        fixture
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn patterns_file(&self) -> PathBuf {
        self.path("config/patterns.json")
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.path("docs")
    }

    pub fn write_patterns(&self, value: &Value) {
        fs::write(self.patterns_file(), serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    pub fn patterns_bytes(&self) -> Vec<u8> {
        fs::read(self.patterns_file()).unwrap()
    }

    pub fn patterns(&self) -> PatternConfig {
        serde_json::from_slice(&self.patterns_bytes()).unwrap()
    }

    pub fn write_doc(&self, stem: &str, value: &Value) {
        let path = self.docs_dir().join(format!("{stem}_extracted_revised.json"));
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    /// Placeholder source files; the fake extractor never reads them
    pub fn add_sources(&self, stems: &[&str]) {
        for stem in stems {
            fs::write(self.path(&format!("sources/{stem}.pdf")), b"%PDF-1.4").unwrap();
        }
    }

    pub fn write_mutations(&self, mutations: &[Mutation]) -> PathBuf {
        let path = self.path("mutations.json");
        fs::write(&path, serde_json::to_string_pretty(mutations).unwrap()).unwrap();
        path
    }

    /// One round, no LLM, no gates, pattern dir as the only allowed root
    pub fn config(&self) -> AutofixConfig {
        AutofixConfig {
            max_rounds: 1,
            max_mutations: 3,
            dry_run: false,
            llm: LlmConfig {
                enabled: false,
                ..LlmConfig::default()
            },
            quality: QualityConfig::default(),
            regression: RegressionConfig::default(),
            paths: PathsConfig {
                patterns_file: self.patterns_file(),
                backup_root: self.path("backups"),
                work_dir: self.docs_dir(),
                mutations_file: None,
                allowed_roots: vec![self.path("config")],
                project_root: Some(self.root.path().to_path_buf()),
                source_dir: None,
            },
        }
    }
}

/// Emits a clean payer only once the pattern file carries a `common.payer`
/// override, mimicking an extractor that honours overrides
pub struct OverrideAwareExtractor {
    patterns_file: PathBuf,
    pub calls: AtomicUsize,
}

impl OverrideAwareExtractor {
    pub fn new(patterns_file: PathBuf) -> Self {
        Self {
            patterns_file,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for OverrideAwareExtractor {
    async fn extract(&self, source: &Path) -> Result<Value, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = |message: String| ExtractionError::Failed {
            source_path: source.to_path_buf(),
            message,
        };
        let raw = fs::read_to_string(&self.patterns_file).map_err(|e| failed(e.to_string()))?;
        let patterns: PatternConfig =
            serde_json::from_str(&raw).map_err(|e| failed(e.to_string()))?;
        let payer = if patterns.overrides_for("common", "payer").is_empty() {
            SPACED_PAYER
        } else {
            CLEAN_PAYER
        };
        Ok(bank_receipt(payer))
    }
}

/// Replies with a fixed text and remembers what it was asked
pub struct ScriptedSuggester {
    reply: String,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedSuggester {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl MutationSuggester for ScriptedSuggester {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SuggestionError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }
}

pub struct FailingGate;

#[async_trait]
impl QualityGate for FailingGate {
    async fn check(&self) -> Result<QualityReport, AutofixError> {
        Ok(QualityReport {
            failed_command: Some("mypy src".to_string()),
            exit_code: Some(1),
        })
    }
}

/// Fails every source, as a crashed OCR backend would
pub struct BrokenExtractor;

#[async_trait]
impl ExtractionService for BrokenExtractor {
    async fn extract(&self, source: &Path) -> Result<Value, ExtractionError> {
        Err(ExtractionError::Failed {
            source_path: source.to_path_buf(),
            message: "OCR backend unavailable".to_string(),
        })
    }
}
