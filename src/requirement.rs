//! Requirements: named, severity-tagged groups of checks.
//!
//! A requirement is declared by exactly one profile in exactly one source
//! file. Its sort position is the order key `(severity desc, source path,
//! name)`; its identity across an inheritance chain is the pair (name,
//! set of check identifiers).

use crate::checks::Check;
use crate::error::ValidatorError;
use crate::models::Severity;
use std::cmp::{Ordering, Reverse};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which declaration form produced the requirement.
pub enum RequirementKind {
    Shape,
    Predicate,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
/// Identity of a requirement for collision detection across profiles.
pub struct RequirementIdentity {
    pub name: String,
    pub checks: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Requirement {
    name: String,
    description: String,
    severity: Severity,
    profile: String,
    kind: RequirementKind,
    source: PathBuf,
    /// Source path relative to the profile directory, `/`-separated.
    source_key: String,
    /// Declaration index within the source file.
    position: usize,
    checks: Vec<Check>,
}

impl Requirement {
    pub fn builder(profile: impl Into<String>, name: impl Into<String>) -> RequirementBuilder {
        RequirementBuilder {
            name: name.into(),
            description: String::new(),
            severity: Severity::Required,
            profile: profile.into(),
            kind: RequirementKind::Predicate,
            source: PathBuf::new(),
            source_key: String::new(),
            position: 0,
            checks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Identifier of the declaring profile.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn kind(&self) -> RequirementKind {
        self.kind
    }

    pub fn source(&self) -> &PathBuf {
        &self.source
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Checks at or above `level`, in declaration order.
    pub fn get_checks_by_severity(&self, level: Severity) -> Vec<&Check> {
        self.checks.iter().filter(|c| c.severity() >= level).collect()
    }

    pub fn identity(&self) -> RequirementIdentity {
        RequirementIdentity {
            name: self.name.clone(),
            checks: self.checks.iter().map(|c| c.id().to_string()).collect(),
        }
    }

    /// Deterministic execution order: severity descending, then source
    /// path, then name. Profile and declaration index break remaining ties.
    pub fn order_cmp(&self, other: &Requirement) -> Ordering {
        (
            Reverse(self.severity),
            self.source_key.as_str(),
            self.name.as_str(),
            self.profile.as_str(),
            self.position,
        )
            .cmp(&(
                Reverse(other.severity),
                other.source_key.as_str(),
                other.name.as_str(),
                other.profile.as_str(),
                other.position,
            ))
    }
}

/// Load-time builder; `build` enforces unique check identifiers.
pub struct RequirementBuilder {
    name: String,
    description: String,
    severity: Severity,
    profile: String,
    kind: RequirementKind,
    source: PathBuf,
    source_key: String,
    position: usize,
    checks: Vec<Check>,
}

impl RequirementBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn kind(mut self, kind: RequirementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn source(mut self, source: impl Into<PathBuf>, source_key: impl Into<String>) -> Self {
        self.source = source.into();
        self.source_key = source_key.into();
        self
    }

    pub fn position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn build(self) -> Result<Requirement, ValidatorError> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for c in &self.checks {
            if !seen.insert(c.id()) {
                return Err(ValidatorError::DuplicateCheckIdentifier {
                    requirement: self.name.clone(),
                    check: c.id().to_string(),
                    path: self.source.clone(),
                });
            }
        }
        Ok(Requirement {
            name: self.name,
            description: self.description,
            severity: self.severity,
            profile: self.profile,
            kind: self.kind,
            source: self.source,
            source_key: self.source_key,
            position: self.position,
            checks: self.checks,
        })
    }
}
