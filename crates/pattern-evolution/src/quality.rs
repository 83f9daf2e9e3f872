//! Static-analysis gate run after a pattern write

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::error::AutofixError;

/// Outcome of one gate run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityReport {
    /// First command that exited non-zero, if any
    pub failed_command: Option<String>,
    pub exit_code: Option<i32>,
}

impl QualityReport {
    pub fn passed() -> Self {
        Self {
            failed_command: None,
            exit_code: None,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.failed_command.is_none()
    }
}

#[async_trait]
pub trait QualityGate: Send + Sync {
    async fn check(&self) -> Result<QualityReport, AutofixError>;
}

/// Runs each argv in the project root, stopping at the first failure
#[derive(Debug, Clone)]
pub struct CommandQualityGate {
    commands: Vec<Vec<String>>,
    cwd: PathBuf,
}

impl CommandQualityGate {
    pub fn new(commands: Vec<Vec<String>>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            commands,
            cwd: cwd.into(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

#[async_trait]
impl QualityGate for CommandQualityGate {
    #[instrument(skip(self), fields(commands = self.commands.len()))]
    async fn check(&self) -> Result<QualityReport, AutofixError> {
        for argv in &self.commands {
            let Some((program, args)) = argv.split_first() else {
                continue;
            };
            let rendered = argv.join(" ");
            let status = Command::new(program)
                .args(args)
                .current_dir(&self.cwd)
                .status()
                .await
                .map_err(|source| AutofixError::QualityCommand {
                    command: rendered.clone(),
                    source,
                })?;
            if !status.success() {
                warn!(command = %rendered, code = ?status.code(), "Quality command failed");
                return Ok(QualityReport {
                    failed_command: Some(rendered),
                    exit_code: status.code(),
                });
            }
            info!(command = %rendered, "Quality command passed");
        }
        Ok(QualityReport::passed())
    }
}
