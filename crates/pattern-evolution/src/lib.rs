//! Guarded evolution of the extractor's pattern configuration
//!
//! When validation reports show systematic, repairable extraction errors,
//! this crate proposes override regexes, writes them to the pattern file
//! through a backup-first executor, and keeps them only if the quality and
//! regression gates pass and the document set measurably improves.
//!
//! # Components
//!
//! - [`mutator`]: applies `append_override_regex` mutations in memory
//! - [`executor`]: path-confined backup, atomic apply and restore by run id
//! - [`regression`]: labeled-sample gate over an [`ExtractionService`]
//! - [`suggest`]: prompt building and untrusted reply parsing
//! - [`quality`]: external static-analysis commands
//! - [`autofix`]: the round loop tying them together
//!
//! # Example
//!
//! ```no_run
//! use pattern_evolution::{AutofixConfig, AutofixOrchestrator};
//! use validation_engine::{Spec, ValidationOptions};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let spec = Spec::from_file("config/validation_spec.json")?;
//! let config = AutofixConfig::from_file("autofix.toml")?;
//!
//! let orchestrator = AutofixOrchestrator::new(&spec, ValidationOptions::default(), config)?;
//! let outcome = orchestrator.run().await?;
//! outcome.persist()?;
//! println!("{} round(s) committed", outcome.committed_rounds());
//! # Ok(())
//! # }
//! ```

pub mod autofix;
pub mod config;
pub mod error;
pub mod executor;
pub mod extraction;
pub mod mutator;
pub mod quality;
pub mod regression;
pub mod suggest;

pub use autofix::{
    is_improvement, AutofixOrchestrator, AutofixOutcome, RollbackReason, RoundOutcome, RoundRecord,
    StopReason, MAX_ROUNDS_EXCEEDED,
};
pub use config::AutofixConfig;
pub use error::{
    AutofixError, ExecutorError, ExtractionError, MutationError, RegressionError, SuggestionError,
};
pub use executor::{RestoreSummary, SafeFileExecutor};
pub use extraction::{extract_batch, ExtractionService};
pub use mutator::{load_mutation_batch, parse_mutation_batch, PatternMutator};
pub use quality::{CommandQualityGate, QualityGate, QualityReport};
pub use regression::RegressionRunner;
pub use suggest::{mutations_from_reply, MutationSuggester};
