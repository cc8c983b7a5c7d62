//! Shared data models: severities, on-disk declarations, and run results.

pub mod declaration;
pub mod result;
pub mod severity;

pub use result::{
    AbortReason, CheckOutcome, CheckStatus, Issue, IssueKind, RequirementRef, Summary,
    ValidationResult,
};
pub use severity::Severity;
