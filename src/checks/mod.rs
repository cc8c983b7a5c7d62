//! Checks: the unit of evaluation.
//!
//! A [`Check`] is an explicit record (identifier, name, description,
//! severity) plus what it executes:
//! - [`CheckKind::Shape`]: a single-property shape fragment handed to the
//!   conformance engine together with the crate's metadata graph;
//! - [`CheckKind::Predicate`]: a plain function looked up by key in the
//!   [`PredicateRegistry`] when the profile is loaded.
//!
//! Checks are immutable and shared between runs; any per-run state (parsed
//! descriptor, metadata graph) lives on the [`ValidationContext`].

pub mod rocrate;
pub mod workflow;

use crate::context::ValidationContext;
use crate::engine::Shape;
use crate::error::{CheckError, ExecutionError};
use crate::graph::MetadataGraph;
use crate::models::{IssueKind, Severity};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Signature of a predicate check.
///
/// Returns `Ok(true)` when the condition holds. Violations are reported by
/// adding issues to the sink before returning `Ok(false)`.
pub type PredicateFn = fn(&ValidationContext, &mut IssueSink) -> Result<bool, CheckError>;

#[derive(Debug, Clone)]
/// An issue reported by a check, before it is attributed to a requirement.
pub struct PendingIssue {
    pub message: String,
    /// `None` ⇒ the requirement's declared severity.
    pub severity: Option<Severity>,
    pub kind: IssueKind,
    pub focus_node: Option<String>,
    pub path: Option<String>,
    pub value: Option<String>,
}

impl PendingIssue {
    pub fn violation(message: impl Into<String>) -> Self {
        PendingIssue {
            message: message.into(),
            severity: None,
            kind: IssueKind::Violation,
            focus_node: None,
            path: None,
            value: None,
        }
    }
}

#[derive(Debug, Default)]
/// Run-scoped accumulator a check reports its issues into.
pub struct IssueSink {
    issues: Vec<PendingIssue>,
}

impl IssueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.issues.push(PendingIssue::violation(message));
    }

    /// Add an issue focused on a metadata entity.
    pub fn add_at(&mut self, focus_node: &str, message: impl Into<String>) {
        let mut issue = PendingIssue::violation(message);
        issue.focus_node = Some(focus_node.to_string());
        self.issues.push(issue);
    }

    pub fn push(&mut self, issue: PendingIssue) {
        self.issues.push(issue);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn into_issues(self) -> Vec<PendingIssue> {
        self.issues
    }
}

#[derive(Clone)]
pub struct PredicateCheck {
    /// Registry key the function was resolved from.
    pub function: String,
    pub func: PredicateFn,
}

impl fmt::Debug for PredicateCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateCheck")
            .field("function", &self.function)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum CheckKind {
    Shape(Shape),
    Predicate(PredicateCheck),
}

#[derive(Debug, Clone)]
/// One testable assertion.
pub struct Check {
    id: String,
    name: String,
    description: String,
    severity: Severity,
    kind: CheckKind,
}

impl Check {
    pub fn shape(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        fragment: Shape,
    ) -> Self {
        Check {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            severity,
            kind: CheckKind::Shape(fragment),
        }
    }

    pub fn predicate(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        function: impl Into<String>,
        func: PredicateFn,
    ) -> Self {
        Check {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            severity,
            kind: CheckKind::Predicate(PredicateCheck {
                function: function.into(),
                func,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
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

    pub fn kind(&self) -> &CheckKind {
        &self.kind
    }

    /// Short label of the execution kind.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            CheckKind::Shape(_) => "shape",
            CheckKind::Predicate(_) => "predicate",
        }
    }

    /// Run the check against the context, reporting issues into `sink`.
    ///
    /// `Ok(true)` means the condition holds. Predicate errors and panics are
    /// caught and returned as [`ExecutionError`]; they never pass silently.
    pub fn execute(
        &self,
        ctx: &ValidationContext,
        sink: &mut IssueSink,
    ) -> Result<bool, ExecutionError> {
        match &self.kind {
            CheckKind::Shape(fragment) => execute_shape(fragment, ctx, sink),
            CheckKind::Predicate(p) => {
                let func = p.func;
                match catch_unwind(AssertUnwindSafe(|| func(ctx, sink))) {
                    Ok(Ok(holds)) => Ok(holds),
                    Ok(Err(e)) => Err(ExecutionError::Predicate(e)),
                    Err(payload) => Err(ExecutionError::Panicked(panic_message(payload))),
                }
            }
        }
    }
}

fn execute_shape(
    fragment: &Shape,
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, ExecutionError> {
    let graph: &MetadataGraph = ctx
        .metadata_graph()
        .map_err(|e| ExecutionError::NotEvaluated(e.to_string()))?;
    let report = ctx.engine().validate(
        std::slice::from_ref(fragment),
        graph,
        &ctx.engine_options(),
    )?;
    for v in report.violations {
        sink.push(PendingIssue {
            message: v.message,
            severity: v.severity.as_deref().and_then(Severity::from_engine),
            kind: IssueKind::Violation,
            focus_node: Some(v.focus_node),
            path: v.result_path,
            value: v.value,
        });
    }
    Ok(report.conforms)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Explicit table of predicate functions available to rule declarations.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    functions: BTreeMap<String, PredicateFn>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the RO-Crate and Workflow RO-Crate predicates.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        rocrate::register(&mut reg);
        workflow::register(&mut reg);
        reg
    }

    /// Register a function; an existing key is replaced.
    pub fn register(&mut self, key: impl Into<String>, func: PredicateFn) {
        self.functions.insert(key.into(), func);
    }

    pub fn get(&self, key: &str) -> Option<PredicateFn> {
        self.functions.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

/// Metadata graph for predicates that need one.
///
/// `None` when the descriptor is missing or unparseable; those conditions
/// are reported by the descriptor checks, so dependent predicates pass
/// vacuously instead of repeating the same failure.
pub(crate) fn graph_or_skip<'a>(
    ctx: &'a ValidationContext,
    check: &str,
) -> Option<&'a MetadataGraph> {
    match ctx.metadata_graph() {
        Ok(g) => Some(g),
        Err(e) => {
            tracing::debug!(check, reason = %e, "metadata graph unavailable; passing vacuously");
            None
        }
    }
}

/// True for `@id`s that denote files inside the crate rather than web
/// resources or local identifiers.
pub(crate) fn is_local_reference(id: &str) -> bool {
    !(id.starts_with('#') || id.starts_with("_:") || id.contains("://") || id.starts_with("urn:"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::context_for;
    use crate::engine::{PropertyConstraint, ShapeTarget};
    use crate::error::StorageError;
    use crate::storage::MemoryCrate;

    fn always_err(_: &ValidationContext, _: &mut IssueSink) -> Result<bool, CheckError> {
        Err(CheckError::Storage(StorageError::NotFound("x".into())))
    }

    fn always_panics(_: &ValidationContext, _: &mut IssueSink) -> Result<bool, CheckError> {
        panic!("boom")
    }

    fn reports(_: &ValidationContext, sink: &mut IssueSink) -> Result<bool, CheckError> {
        sink.add("nope");
        Ok(false)
    }

    #[test]
    fn test_predicate_error_and_panic_are_not_silent_passes() {
        let ctx = context_for(MemoryCrate::new("m"));
        let mut sink = IssueSink::new();
        let c = Check::predicate("e", "e", "", Severity::Required, "t.err", always_err);
        assert!(matches!(
            c.execute(&ctx, &mut sink),
            Err(ExecutionError::Predicate(_))
        ));
        let p = Check::predicate("p", "p", "", Severity::Required, "t.panic", always_panics);
        match p.execute(&ctx, &mut sink) {
            Err(ExecutionError::Panicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_predicate_reports_into_sink() {
        let ctx = context_for(MemoryCrate::new("m"));
        let mut sink = IssueSink::new();
        let c = Check::predicate("r", "r", "", Severity::Optional, "t.reports", reports);
        assert!(!c.execute(&ctx, &mut sink).unwrap());
        assert_eq!(sink.len(), 1);
        assert_eq!(c.kind_name(), "predicate");
    }

    #[test]
    fn test_shape_check_maps_engine_severity() {
        let meta = r#"{"@context": "x", "@graph": [
            {"@id": "ro-crate-metadata.json", "about": {"@id": "./"}},
            {"@id": "./", "@type": "Dataset"}]}"#;
        let ctx = context_for(MemoryCrate::new("m").with_file("ro-crate-metadata.json", meta));
        let mut prop = PropertyConstraint::new("root-name", "name");
        prop.min_count = Some(1);
        prop.severity = Some("sh:Warning".into());
        let fragment = Shape {
            name: "Root".into(),
            target: ShapeTarget::RootDataEntity,
            properties: vec![prop],
        };
        let c = Check::shape("root-name", "Root name", "", Severity::Recommended, fragment);
        let mut sink = IssueSink::new();
        assert!(!c.execute(&ctx, &mut sink).unwrap());
        let issues = sink.into_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Some(Severity::Recommended));
        assert_eq!(issues[0].focus_node.as_deref(), Some("./"));
        assert_eq!(issues[0].path.as_deref(), Some("name"));
    }

    #[test]
    fn test_shape_check_without_graph_is_not_evaluated() {
        let ctx = context_for(MemoryCrate::new("m").with_file("ro-crate-metadata.json", "{oops"));
        let fragment = Shape {
            name: "Root".into(),
            target: ShapeTarget::RootDataEntity,
            properties: vec![PropertyConstraint::new("x", "name")],
        };
        let c = Check::shape("x", "x", "", Severity::Required, fragment);
        let mut sink = IssueSink::new();
        assert!(matches!(
            c.execute(&ctx, &mut sink),
            Err(ExecutionError::NotEvaluated(_))
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_registry_lookup() {
        let reg = PredicateRegistry::with_builtins();
        assert!(reg.get("rocrate.file_descriptor_exists").is_some());
        assert!(reg.get("workflow.main_entity_exists").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn test_local_reference() {
        assert!(is_local_reference("data/file.csv"));
        assert!(!is_local_reference("#alice"));
        assert!(!is_local_reference("https://orcid.org/0000"));
    }
}
