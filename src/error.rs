//! Error taxonomy.
//!
//! `ValidatorError` covers everything that aborts a run before any check
//! executes: profile discovery, rule-declaration parsing, inheritance
//! conflicts, and crate access. Errors raised while a single check runs are
//! `CheckError` (predicates) or `EngineError` (conformance engine); the
//! validator turns those into failed checks with a diagnostic issue instead
//! of propagating them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("profiles directory not found: {}", .0.display())]
    ProfilesDirectoryNotFound(PathBuf),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("invalid profile path {}: {reason}", .path.display())]
    InvalidProfilePath { path: PathBuf, reason: String },

    #[error("requirement `{requirement}` is declared by both `{first}` and `{second}` (enable override to let the child profile win)")]
    DuplicateRequirementCheck {
        requirement: String,
        first: String,
        second: String,
    },

    #[error("check identifier `{check}` is declared twice in requirement `{requirement}` ({})", .path.display())]
    DuplicateCheckIdentifier {
        requirement: String,
        check: String,
        path: PathBuf,
    },

    #[error("malformed rule declaration {}: {reason}", .path.display())]
    MalformedRuleDeclaration { path: PathBuf, reason: String },

    #[error("unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("inheritance cycle detected: {0}")]
    InheritanceCycle(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures of the crate storage boundary.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("crate not found: {0}")]
    CrateNotFound(String),

    #[error("file not found in crate: {0}")]
    NotFound(String),

    #[error("path escapes the crate root: {0}")]
    InvalidPath(String),

    #[error("unsupported crate location: {0}")]
    Unsupported(String),

    #[error("cannot decode {path} as UTF-8 text")]
    NotText { path: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the conformance engine (invalid shapes, unusable input).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid shape `{shape}`: {reason}")]
    InvalidShape { shape: String, reason: String },

    #[error("conformance engine failed: {0}")]
    Failed(String),
}

/// Unexpected failure inside a predicate check.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Internal(String),
}

/// Why a single check did not produce a pass/fail verdict.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A precondition of the check was not met; it was not run.
    #[error("not evaluated: {0}")]
    NotEvaluated(String),

    #[error("predicate raised an error: {0}")]
    Predicate(#[from] CheckError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("check panicked: {0}")]
    Panicked(String),
}
