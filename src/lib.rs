//! rocrate-validator core library.
//!
//! This crate validates RO-Crate metadata packages against named, versioned
//! profiles: hierarchies of severity-ranked requirements, each backed by
//! graph-constraint or predicate checks.
//!
//! High-level modules:
//! - `cli`: CLI argument parsing (binary uses this).
//! - `config`: Discovery and effective configuration resolution.
//! - `bundled`: Profiles embedded in the binary.
//! - `models`: Severity, rule-declaration schema, and validation results.
//! - `storage`: Uniform read access to directory and archive crates.
//! - `graph`: Typed view of the crate's JSON-LD metadata.
//! - `engine`: Conformance-engine boundary and the built-in shape engine.
//! - `checks`: Checks, the predicate registry, and built-in predicates.
//! - `requirement` / `profile`: Runtime rule model and the profile loader.
//! - `resolver`: Profile registry, inheritance, and override resolution.
//! - `context` / `validator`: Per-run context and the validation orchestrator.
//! - `output`: Human/JSON printers for results and profiles.
pub mod bundled;
pub mod checks;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod models;
pub mod output;
pub mod profile;
pub mod requirement;
pub mod resolver;
pub mod storage;
pub mod validator;

pub use error::ValidatorError;
pub use models::{Severity, ValidationResult};
pub use validator::{ValidationRequest, Validator};
