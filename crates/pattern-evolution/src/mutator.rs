//! In-memory editing of the extractor's pattern configuration

use regex::Regex;
use shared_types::{Mutation, OverrideRule, PatternConfig, APPEND_OVERRIDE_REGEX};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::MutationError;

/// Holds one pattern file's configuration and applies mutations to it.
///
/// Nothing is written until [`PatternMutator::save`] is called; the
/// orchestrator persists through the safe executor instead.
#[derive(Debug, Clone)]
pub struct PatternMutator {
    path: PathBuf,
    config: PatternConfig,
}

impl PatternMutator {
    pub fn new(path: impl Into<PathBuf>, config: PatternConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MutationError> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|source| MutationError::Io {
            path: path.clone(),
            source,
        })?;
        let config: PatternConfig = serde_json::from_str(&content)?;
        debug!(path = %path.display(), overrides = config.override_ids().count(), "Loaded pattern config");
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    pub fn into_config(self) -> PatternConfig {
        self.config
    }

    /// Append an override rule. The regex is compiled up front and the id
    /// must not exist anywhere in the override tree.
    pub fn append_override(
        &mut self,
        doc_type: &str,
        field: &str,
        regex: &str,
        id: &str,
        priority: i64,
    ) -> Result<(), MutationError> {
        Regex::new(regex).map_err(|source| MutationError::InvalidRegex {
            id: id.to_string(),
            source,
        })?;
        if self.config.has_override_id(id) {
            return Err(MutationError::DuplicateId(id.to_string()));
        }

        self.config
            .field_patterns_overrides
            .entry(doc_type.to_string())
            .or_default()
            .entry(field.to_string())
            .or_default()
            .push(OverrideRule::new(id, regex, priority));
        info!(doc_type, field, id, priority, "Appended override regex");
        Ok(())
    }

    pub fn apply_mutation(&mut self, mutation: &Mutation) -> Result<(), MutationError> {
        if mutation.action != APPEND_OVERRIDE_REGEX {
            return Err(MutationError::UnsupportedAction(mutation.action.clone()));
        }
        for (name, value) in [
            ("doc_type", &mutation.doc_type),
            ("field", &mutation.field),
            ("regex", &mutation.regex),
            ("id", &mutation.id),
        ] {
            if value.is_empty() {
                return Err(MutationError::MissingField(name));
            }
        }
        self.append_override(
            &mutation.doc_type,
            &mutation.field,
            &mutation.regex,
            &mutation.id,
            mutation.priority,
        )
    }

    /// Apply mutations in order, stopping at the first rejection
    pub fn apply_all(&mut self, mutations: &[Mutation]) -> Result<(), MutationError> {
        mutations.iter().try_for_each(|m| self.apply_mutation(m))
    }

    /// Write the configuration back to its file, pretty-printed
    pub fn save(&self) -> Result<(), MutationError> {
        let content = serde_json::to_string_pretty(&self.config)?;
        fs::write(&self.path, content).map_err(|source| MutationError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Parse a mutation batch: a JSON array of mutation objects
pub fn parse_mutation_batch(text: &str) -> Result<Vec<Mutation>, MutationError> {
    Ok(serde_json::from_str(text)?)
}

pub fn load_mutation_batch(path: &Path) -> Result<Vec<Mutation>, MutationError> {
    let content = fs::read_to_string(path).map_err(|source| MutationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_mutation_batch(&content)
}
