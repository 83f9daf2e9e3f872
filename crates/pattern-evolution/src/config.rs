//! Configuration parsing for autofix runs
//!
//! Runs are described in TOML: the round budget, the candidate sources, the
//! gates, and the paths the executor is allowed to touch.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure loaded from TOML files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutofixConfig {
    /// Maximum number of mutation rounds (default: 1)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Maximum candidates applied per round (default: 3)
    #[serde(default = "default_max_mutations")]
    pub max_mutations: usize,
    /// Roll back every round even when it improves
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub regression: RegressionConfig,
    pub paths: PathsConfig,
}

impl AutofixConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pattern_evolution::config::AutofixConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = AutofixConfig::from_file("autofix.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// ```
    /// use pattern_evolution::config::AutofixConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let toml = r#"
    ///     [paths]
    ///     patterns_file = "config/patterns.json"
    ///     backup_root = "backups"
    ///     work_dir = "out"
    /// "#;
    /// let config = AutofixConfig::from_str(toml)?;
    /// assert_eq!(config.max_rounds, 1);
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    /// Roots the executor may write under. Defaults to the pattern file's
    /// directory when none are listed.
    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        if !self.paths.allowed_roots.is_empty() {
            return self.paths.allowed_roots.clone();
        }
        let parent = self
            .paths
            .patterns_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        vec![parent.to_path_buf()]
    }

    /// Directory the quality commands run in
    pub fn project_root(&self) -> PathBuf {
        self.paths
            .project_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Quality commands to run, empty when the gate is disabled
    pub fn quality_commands(&self) -> &[Vec<String>] {
        if self.quality.enabled {
            &self.quality.commands
        } else {
            &[]
        }
    }
}

/// Suggestion collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Failing reports shown to the model (default: 3)
    #[serde(default = "default_max_cases")]
    pub max_cases: usize,
    /// Candidates kept from one reply (default: 3)
    #[serde(default = "default_max_mutations")]
    pub max_mutations: usize,
    /// Characters of extracted text per case (default: 800)
    #[serde(default = "default_llm_preview_len")]
    pub preview_len: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_cases: default_max_cases(),
            max_mutations: default_max_mutations(),
            preview_len: default_llm_preview_len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Each entry is an argv, e.g. `["cargo", "clippy"]`
    #[serde(default)]
    pub commands: Vec<Vec<String>>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Labeled samples; the gate is skipped when unset
    #[serde(default)]
    pub samples_dir: Option<PathBuf>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Concurrent extractions (default: 1)
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            samples_dir: None,
            output_dir: None,
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Pattern configuration file the rounds mutate
    pub patterns_file: PathBuf,
    /// Where run manifests and snapshots go
    pub backup_root: PathBuf,
    /// Document directory validated each round
    pub work_dir: PathBuf,
    /// Optional JSON array of mutations applied every round
    #[serde(default)]
    pub mutations_file: Option<PathBuf>,
    #[serde(default)]
    pub allowed_roots: Vec<PathBuf>,
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    /// Source files to re-extract each round
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
}

fn default_max_rounds() -> usize {
    1
}

fn default_max_mutations() -> usize {
    3
}

fn default_max_cases() -> usize {
    3
}

fn default_llm_preview_len() -> usize {
    800
}

fn default_workers() -> usize {
    1
}

fn default_true() -> bool {
    true
}
