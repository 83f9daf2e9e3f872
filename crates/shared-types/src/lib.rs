pub mod manifest;
pub mod patterns;
pub mod regression;
pub mod types;

pub use manifest::{BackupEntry, BackupManifest};
pub use patterns::{Mutation, OverrideRule, PatternConfig, APPEND_OVERRIDE_REGEX};
pub use regression::{CaseStatus, FieldDiff, RegressionCase, RegressionResult, RegressionStatus};
pub use types::{
    Document, DocumentShapeError, Finding, Report, ReportContext, ReportStatus, Summary,
    EXTRACTED_TEXT_FIELD,
};
