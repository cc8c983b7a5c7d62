//! On-disk schema for profiles.
//!
//! - `profile.toml`: profile manifest (identifier, metadata, parent).
//! - rule files (`*.toml|yaml|yml`): `[[shape]]` graph-constraint
//!   declarations and `[[requirement]]` predicate rule groups.
//!
//! These are raw deserialization targets; the profile loader validates them
//! and builds the runtime model.

use serde::Deserialize;
use serde_json::Value as Json;

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// Profile manifest.
pub struct ProfileManifest {
    pub identifier: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    /// Profile URI matched against a crate's `conformsTo`.
    pub uri: Option<String>,
    /// Parent profile identifier.
    #[serde(alias = "parent")]
    pub inherits: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
/// A rule-declaration file.
pub struct RuleFile {
    #[serde(default)]
    pub shape: Vec<ShapeDecl>,
    #[serde(default)]
    pub requirement: Vec<RequirementDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
/// Graph-constraint declaration; becomes one requirement.
pub struct ShapeDecl {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Explicit severity (name or RFC 2119 keyword).
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub target_node: Option<String>,
    #[serde(default)]
    pub target_class: Option<String>,
    /// Target the root data entity.
    #[serde(default)]
    pub root: bool,
    /// Target the metadata file descriptor.
    #[serde(default)]
    pub descriptor: bool,
    #[serde(default)]
    pub property: Vec<PropertyDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
/// One property constraint; becomes one check.
pub struct PropertyDecl {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    pub path: String,
    #[serde(default)]
    pub min_count: Option<usize>,
    #[serde(default)]
    pub max_count: Option<usize>,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub has_value: Option<Json>,
    #[serde(default, rename = "in")]
    pub in_values: Vec<Json>,
    #[serde(default)]
    pub message: Option<String>,
    /// Engine severity vocabulary (`Violation`, `Warning`, `Info`).
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
/// Predicate rule group; becomes one requirement.
pub struct RequirementDecl {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub check: Vec<CheckDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckDecl {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    /// Key into the predicate registry.
    pub function: String,
}
