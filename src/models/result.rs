//! Validation outcome: issues, per-check outcomes, and the aggregated result.
//!
//! Everything here is kept in execution order. Nothing is re-sorted
//! after the run, so queries return entries in the order checks ran.

use crate::models::severity::Severity;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Distinguishes a rule that was evaluated and failed from one that could
/// not be evaluated.
pub enum IssueKind {
    Violation,
    ExecutionError,
}

#[derive(Debug, Clone, Serialize)]
/// A single recorded violation, attributable to one check of one requirement.
pub struct Issue {
    pub profile: String,
    pub requirement: String,
    /// Execution ordinal of the requirement; see [`RequirementRef::index`].
    pub requirement_index: usize,
    pub check: String,
    pub check_name: String,
    /// Severity of the originating check; drives `passed` and filtering.
    pub check_severity: Severity,
    /// Severity reported for this issue (engine-mapped for shape checks).
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// The check raised an error; it was not evaluated to completion.
    Errored,
    /// A precondition of the check was not met (e.g. no metadata graph).
    NotEvaluated(String),
    /// Listed in the run's skip-set.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
/// Outcome of one selected check.
pub struct CheckOutcome {
    pub profile: String,
    pub requirement: String,
    pub requirement_index: usize,
    pub check: String,
    pub check_name: String,
    pub severity: Severity,
    #[serde(flatten)]
    pub status: CheckStatus,
}

impl CheckOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, CheckStatus::Failed | CheckStatus::Errored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Why a run stopped before executing every selected check.
pub enum AbortReason {
    FailFast,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A requirement reference in result queries.
pub struct RequirementRef {
    /// Position in the run's resolved requirement list. Names are not unique
    /// within a profile, so outcomes and issues refer back through this.
    pub index: usize,
    pub profile: String,
    pub name: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub requirements: usize,
    pub failed_requirements: usize,
    pub checks: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub not_evaluated: usize,
    pub skipped: usize,
    pub issues: usize,
}

#[derive(Debug, Clone, Serialize)]
/// Frozen result of one validation run.
pub struct ValidationResult {
    pub crate_location: String,
    pub profile: String,
    /// Profiles whose requirements were considered, child first.
    pub profile_chain: Vec<String>,
    pub severity: Severity,
    pub requirements: Vec<RequirementRef>,
    pub outcomes: Vec<CheckOutcome>,
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortReason>,
}

impl ValidationResult {
    pub fn new(
        crate_location: impl Into<String>,
        profile: impl Into<String>,
        profile_chain: Vec<String>,
        severity: Severity,
    ) -> Self {
        ValidationResult {
            crate_location: crate_location.into(),
            profile: profile.into(),
            profile_chain,
            severity,
            requirements: Vec::new(),
            outcomes: Vec::new(),
            issues: Vec::new(),
            aborted: None,
        }
    }

    /// True iff no issue belongs to a check whose severity is ≥ `threshold`.
    pub fn passed(&self, threshold: Severity) -> bool {
        !self.issues.iter().any(|i| i.check_severity >= threshold)
    }

    /// Passed at the run's own severity threshold.
    pub fn passed_at_run_severity(&self) -> bool {
        self.passed(self.severity)
    }

    /// Requirements with at least one failed or errored check, in execution order.
    pub fn failed_requirements(&self) -> Vec<RequirementRef> {
        let mut out: Vec<RequirementRef> = Vec::new();
        for o in self.outcomes.iter().filter(|o| o.is_failure()) {
            if out.iter().any(|r| r.index == o.requirement_index) {
                continue;
            }
            if let Some(r) = self.requirement(o.requirement_index) {
                out.push(r.clone());
            }
        }
        out
    }

    /// The listed requirement with execution ordinal `index`.
    pub fn requirement(&self, index: usize) -> Option<&RequirementRef> {
        self.requirements.iter().find(|r| r.index == index)
    }

    /// Issues raised by the requirement with execution ordinal `index`.
    pub fn issues_of(&self, index: usize) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| i.requirement_index == index)
            .collect()
    }

    /// Failed or errored check outcomes, in execution order.
    pub fn failed_checks(&self) -> Vec<&CheckOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure()).collect()
    }

    /// Issues whose check severity is ≥ `min_severity`, in execution order.
    pub fn get_issues(&self, min_severity: Severity) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| i.check_severity >= min_severity)
            .collect()
    }

    /// Issues raised because a check could not be evaluated.
    pub fn execution_errors(&self) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| i.kind == IssueKind::ExecutionError)
            .collect()
    }

    pub fn summary(&self) -> Summary {
        let mut s = Summary {
            requirements: self.requirements.len(),
            failed_requirements: self.failed_requirements().len(),
            checks: self.outcomes.len(),
            issues: self.issues.len(),
            ..Default::default()
        };
        for o in &self.outcomes {
            match o.status {
                CheckStatus::Passed => s.passed += 1,
                CheckStatus::Failed => s.failed += 1,
                CheckStatus::Errored => s.errored += 1,
                CheckStatus::NotEvaluated(_) => s.not_evaluated += 1,
                CheckStatus::Skipped => s.skipped += 1,
            }
        }
        s
    }
}
