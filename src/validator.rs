//! Validation orchestrator.
//!
//! A run moves through `Built → Resolving → Executing → Completed`:
//! the requested (or detected) profile is resolved into an ordered
//! requirement list, then every selected check runs in that order against
//! one shared [`ValidationContext`]. Load-time problems end the run in
//! `Resolving` with an error before any check executes; check failures are
//! recorded in the result and never abort the run unless fail-fast is on.
//!
//! A single run is sequential. Independent runs may execute in parallel
//! through [`Validator::validate_many`].

use crate::checks::{IssueSink, PendingIssue};
use crate::context::{CancelToken, RunSettings, ValidationContext};
use crate::engine::{BuiltinShapeEngine, ConformanceEngine, InferenceMode};
use crate::error::{ExecutionError, ValidatorError};
use crate::graph::{reference_id, MetadataGraph};
use crate::models::{
    AbortReason, CheckOutcome, CheckStatus, Issue, IssueKind, RequirementRef, Severity,
    ValidationResult,
};
use crate::requirement::Requirement;
use crate::resolver::ProfileRegistry;
use crate::storage::{open_crate, CrateStorage};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
/// Parameters of one validation run.
pub struct ValidationRequest {
    /// Directory or archive path of the crate.
    pub crate_location: String,
    /// Target profile; detected from `conformsTo` when absent.
    pub profile: Option<String>,
    pub inherit: bool,
    pub allow_override: bool,
    /// Checks below this severity are not run.
    pub severity: Severity,
    pub fail_fast: bool,
    /// Check ids (`id` or `profile.id`) to skip.
    pub skip_checks: BTreeSet<String>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl Default for ValidationRequest {
    fn default() -> Self {
        ValidationRequest {
            crate_location: String::new(),
            profile: None,
            inherit: true,
            allow_override: true,
            severity: Severity::Required,
            fail_fast: false,
            skip_checks: BTreeSet::new(),
            timeout: None,
            cancel: None,
        }
    }
}

impl ValidationRequest {
    pub fn new(crate_location: impl Into<String>) -> Self {
        ValidationRequest {
            crate_location: crate_location.into(),
            ..Default::default()
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    fn settings(&self) -> RunSettings {
        RunSettings {
            severity: self.severity,
            inherit: self.inherit,
            allow_override: self.allow_override,
            fail_fast: self.fail_fast,
            skip_checks: self.skip_checks.clone(),
            deadline: self.timeout.map(|t| Instant::now() + t),
            cancel: self.cancel.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Built,
    Resolving,
    Executing,
    Completed,
}

/// Validates crates against the profiles of one registry.
pub struct Validator {
    registry: Arc<ProfileRegistry>,
    engine: Arc<dyn ConformanceEngine>,
    ontology: Option<Arc<MetadataGraph>>,
    inference: InferenceMode,
    default_profile: Option<String>,
}

impl Validator {
    pub fn new(registry: Arc<ProfileRegistry>) -> Self {
        Validator {
            registry,
            engine: Arc::new(BuiltinShapeEngine),
            ontology: None,
            inference: InferenceMode::None,
            default_profile: None,
        }
    }

    /// Replace the conformance engine used by shape checks.
    pub fn with_engine(mut self, engine: Arc<dyn ConformanceEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Ontology graph handed to the engine, with the inference mode to use.
    pub fn with_ontology(mut self, ontology: Arc<MetadataGraph>, inference: InferenceMode) -> Self {
        self.ontology = Some(ontology);
        self.inference = inference;
        self
    }

    /// Profile used when a request names none and the crate declares none.
    pub fn with_default_profile(mut self, profile: impl Into<String>) -> Self {
        self.default_profile = Some(profile.into());
        self
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Open the crate at `request.crate_location` and validate it.
    pub fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, ValidatorError> {
        let storage = open_crate(&request.crate_location)?;
        self.validate_storage(storage, request)
    }

    /// Validate independent requests in parallel; results keep input order.
    pub fn validate_many(
        &self,
        requests: &[ValidationRequest],
    ) -> Vec<Result<ValidationResult, ValidatorError>> {
        requests.par_iter().map(|r| self.validate(r)).collect()
    }

    /// Validate an already-opened crate.
    pub fn validate_storage(
        &self,
        storage: Box<dyn CrateStorage>,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, ValidatorError> {
        let mut run = Run::new(storage.location().to_string());
        let mut ctx = ValidationContext::builder(storage)
            .settings(request.settings())
            .engine(self.engine.clone())
            .ontology(self.ontology.clone(), self.inference)
            .build();

        run.advance(RunState::Resolving);
        let resolved = self
            .select_profile(&ctx, request)
            .and_then(|id| {
                self.registry
                    .resolve(&id, request.inherit, request.allow_override)
            });
        let resolved = match resolved {
            Ok(r) => r,
            Err(e) => {
                run.advance(RunState::Completed);
                tracing::error!(location = %run.location, error = %e, "profile resolution failed");
                return Err(e);
            }
        };
        let chain = resolved.chain_ids();
        let target = chain.first().cloned().unwrap_or_default();
        ctx.bind_profiles(resolved.chain.clone());
        tracing::info!(
            location = %run.location,
            profile = %target,
            severity = %request.severity,
            requirements = resolved.requirements.len(),
            "validation started"
        );

        let mut result =
            ValidationResult::new(run.location.clone(), target, chain, request.severity);
        run.advance(RunState::Executing);
        execute(&ctx, &resolved.requirements, &mut result);
        run.advance(RunState::Completed);

        let s = result.summary();
        tracing::info!(
            location = %run.location,
            passed = result.passed_at_run_severity(),
            checks = s.checks,
            failed = s.failed,
            errored = s.errored,
            issues = s.issues,
            aborted = ?result.aborted,
            "validation finished"
        );
        Ok(result)
    }

    fn select_profile(
        &self,
        ctx: &ValidationContext,
        request: &ValidationRequest,
    ) -> Result<String, ValidatorError> {
        if let Some(p) = &request.profile {
            return Ok(p.clone());
        }
        let declared = declared_conformance(ctx);
        if let Some(p) = self.registry.detect_profile(&declared) {
            tracing::debug!(profile = %p.identifier, "profile detected from conformsTo");
            return Ok(p.identifier.clone());
        }
        self.default_profile.clone().ok_or_else(|| {
            ValidatorError::ProfileNotFound(if declared.is_empty() {
                "no profile requested and the crate declares none".to_string()
            } else {
                format!("no loaded profile matches conformsTo {}", declared.join(", "))
            })
        })
    }
}

struct Run {
    location: String,
    state: RunState,
}

impl Run {
    fn new(location: String) -> Self {
        Run {
            location,
            state: RunState::Built,
        }
    }

    fn advance(&mut self, next: RunState) {
        tracing::trace!(location = %self.location, from = ?self.state, to = ?next, "run state");
        self.state = next;
    }
}

/// `conformsTo` values of the descriptor and the root data entity.
fn declared_conformance(ctx: &ValidationContext) -> Vec<String> {
    let Ok(graph) = ctx.metadata_graph() else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for node in [graph.descriptor(), graph.root_data_entity()].into_iter().flatten() {
        for v in node.values("conformsTo") {
            if let Some(s) = reference_id(v).or_else(|| v.as_str()) {
                if !out.iter().any(|x| x == s) {
                    out.push(s.to_string());
                }
            }
        }
    }
    out
}

fn abort_reason(ctx: &ValidationContext) -> Option<AbortReason> {
    let settings = ctx.settings();
    if settings.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
        return Some(AbortReason::Cancelled);
    }
    if settings.deadline.is_some_and(|d| Instant::now() >= d) {
        return Some(AbortReason::Timeout);
    }
    None
}

/// Run the selected checks of `requirements` in order, filling `result`.
///
/// A requirement is listed once its first selected check is reached.
fn execute(
    ctx: &ValidationContext,
    requirements: &[Arc<Requirement>],
    result: &mut ValidationResult,
) {
    let settings = ctx.settings();
    'run: for (index, req) in requirements.iter().enumerate() {
        let selected = req.get_checks_by_severity(settings.severity);
        let mut listed = false;
        for check in selected {
            if let Some(reason) = abort_reason(ctx) {
                tracing::warn!(reason = ?reason, "validation aborted");
                result.aborted = Some(reason);
                break 'run;
            }
            if !listed {
                result.requirements.push(RequirementRef {
                    index,
                    profile: req.profile().to_string(),
                    name: req.name().to_string(),
                    severity: req.severity(),
                });
                listed = true;
            }
            let outcome = |status| CheckOutcome {
                profile: req.profile().to_string(),
                requirement: req.name().to_string(),
                requirement_index: index,
                check: check.id().to_string(),
                check_name: check.name().to_string(),
                severity: check.severity(),
                status,
            };
            if ctx.is_skipped(req.profile(), check.id()) {
                tracing::debug!(check = check.id(), "skipped");
                result.outcomes.push(outcome(CheckStatus::Skipped));
                continue;
            }

            let mut sink = IssueSink::new();
            let status = match check.execute(ctx, &mut sink) {
                Ok(true) if sink.is_empty() => CheckStatus::Passed,
                Ok(_) => {
                    if sink.is_empty() {
                        sink.add(format!("Check `{}` failed", check.name()));
                    }
                    CheckStatus::Failed
                }
                Err(ExecutionError::NotEvaluated(reason)) => CheckStatus::NotEvaluated(reason),
                Err(e) => {
                    tracing::warn!(check = check.id(), error = %e, "check could not be evaluated");
                    let mut diag = PendingIssue::violation(format!(
                        "Check `{}` could not be evaluated: {}",
                        check.name(),
                        e
                    ));
                    diag.kind = IssueKind::ExecutionError;
                    sink.push(diag);
                    CheckStatus::Errored
                }
            };
            tracing::debug!(
                profile = req.profile(),
                requirement = req.name(),
                check = check.id(),
                status = ?status,
                issues = sink.len(),
                "check executed"
            );

            for pending in sink.into_issues() {
                result.issues.push(Issue {
                    profile: req.profile().to_string(),
                    requirement: req.name().to_string(),
                    requirement_index: index,
                    check: check.id().to_string(),
                    check_name: check.name().to_string(),
                    check_severity: check.severity(),
                    severity: pending.severity.unwrap_or(req.severity()),
                    kind: pending.kind,
                    message: pending.message,
                    focus_node: pending.focus_node,
                    path: pending.path,
                    value: pending.value,
                });
            }
            let failed = matches!(status, CheckStatus::Failed | CheckStatus::Errored);
            result.outcomes.push(outcome(status));
            if failed && settings.fail_fast {
                tracing::info!(check = check.id(), "fail-fast: stopping after first failure");
                result.aborted = Some(AbortReason::FailFast);
                break 'run;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::Check;
    use crate::context::DESCRIPTOR_FILE;
    use crate::engine::{ConformanceReport, EngineOptions, PropertyConstraint, Shape, ShapeTarget};
    use crate::error::{CheckError, EngineError};
    use crate::profile::Profile;
    use crate::requirement::testing::{check, fail, pass};
    use crate::storage::MemoryCrate;

    fn broken(_: &ValidationContext, _: &mut IssueSink) -> Result<bool, CheckError> {
        Err(CheckError::Internal("wires crossed".into()))
    }

    fn silent_false(_: &ValidationContext, _: &mut IssueSink) -> Result<bool, CheckError> {
        Ok(false)
    }

    fn req(profile: &str, name: &str, sev: Severity, checks: Vec<Check>) -> Requirement {
        let mut b = Requirement::builder(profile, name)
            .severity(sev)
            .source("rules.toml", "rules.toml");
        for c in checks {
            b = b.check(c);
        }
        b.build().unwrap()
    }

    fn validator(profiles: Vec<Profile>) -> Validator {
        Validator::new(Arc::new(ProfileRegistry::from_profiles(profiles).unwrap()))
    }

    fn sample() -> Validator {
        let p = Profile::new("p")
            .with_requirement(req(
                "p",
                "A",
                Severity::Required,
                vec![
                    check("a-fail", Severity::Required, fail),
                    check("a-pass", Severity::Required, pass),
                ],
            ))
            .with_requirement(req(
                "p",
                "B",
                Severity::Recommended,
                vec![check("b-fail", Severity::Recommended, fail)],
            ))
            .with_requirement(req(
                "p",
                "C",
                Severity::Optional,
                vec![check("c-err", Severity::Optional, broken)],
            ));
        validator(vec![p])
    }

    fn run(v: &Validator, request: &ValidationRequest) -> ValidationResult {
        v.validate_storage(Box::new(MemoryCrate::new("mem")), request).unwrap()
    }

    #[test]
    fn test_severity_filters_checks() {
        let v = sample();
        let r = run(&v, &ValidationRequest::new("mem").profile("p"));
        assert_eq!(r.outcomes.len(), 2);
        assert_eq!(r.requirements.len(), 1);
        assert!(!r.passed(Severity::Required));

        let all = run(&v, &ValidationRequest::new("mem").profile("p").severity(Severity::Optional));
        assert_eq!(all.outcomes.len(), 4);
        assert_eq!(all.failed_requirements().len(), 3);
        let names: Vec<_> = all.failed_requirements().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_fail_fast_stops_whole_run() {
        let v = sample();
        let r = run(
            &v,
            &ValidationRequest::new("mem")
                .profile("p")
                .severity(Severity::Optional)
                .fail_fast(true),
        );
        assert_eq!(r.outcomes.len(), 1);
        assert_eq!(r.issues.len(), 1);
        assert_eq!(r.aborted, Some(AbortReason::FailFast));
        assert_eq!(r.failed_requirements().len(), 1);
    }

    #[test]
    fn test_errors_are_failures_with_diagnostic_issue() {
        let v = sample();
        let r = run(&v, &ValidationRequest::new("mem").profile("p").severity(Severity::Optional));
        let errs = r.execution_errors();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].check, "c-err");
        assert!(errs[0].message.contains("wires crossed"));
        assert_eq!(r.summary().errored, 1);
        assert!(!r.passed(Severity::Optional));
        assert!(!r.passed(Severity::Recommended));
    }

    #[test]
    fn test_false_without_issue_gets_generic_issue() {
        let p = Profile::new("p").with_requirement(req(
            "p",
            "R",
            Severity::Required,
            vec![check("quiet", Severity::Required, silent_false)],
        ));
        let r = run(&validator(vec![p]), &ValidationRequest::new("mem").profile("p"));
        assert_eq!(r.issues.len(), 1);
        assert_eq!(r.failed_checks().len(), 1);
    }

    #[test]
    fn test_skip_set_and_empty_requirements() {
        let v = sample();
        let mut request = ValidationRequest::new("mem").profile("p");
        request.skip_checks.insert("p.a-fail".into());
        let r = run(&v, &request);
        assert!(r.passed(Severity::Required));
        assert_eq!(r.summary().skipped, 1);
        assert_eq!(r.summary().passed, 1);

        let empty =
            Profile::new("e").with_requirement(req("e", "Nothing", Severity::Required, vec![]));
        let r = run(&validator(vec![empty]), &ValidationRequest::new("mem").profile("e"));
        assert!(r.requirements.is_empty());
        assert!(r.outcomes.is_empty());
        assert!(r.passed(Severity::Optional));
    }

    #[test]
    fn test_cancel_and_timeout_abort_between_checks() {
        let v = sample();
        let token = CancelToken::new();
        token.cancel();
        let mut request = ValidationRequest::new("mem").profile("p");
        request.cancel = Some(token);
        let r = run(&v, &request);
        assert_eq!(r.aborted, Some(AbortReason::Cancelled));
        assert!(r.outcomes.is_empty());
        assert!(r.requirements.is_empty());
        assert_eq!(r.summary().requirements, 0);

        let mut request = ValidationRequest::new("mem").profile("p");
        request.timeout = Some(Duration::ZERO);
        assert_eq!(run(&v, &request).aborted, Some(AbortReason::Timeout));
    }

    #[test]
    fn test_unknown_profile_fails_before_execution() {
        let v = sample();
        let err = v
            .validate_storage(
                Box::new(MemoryCrate::new("mem")),
                &ValidationRequest::new("mem").profile("ghost"),
            )
            .unwrap_err();
        assert!(matches!(err, ValidatorError::ProfileNotFound(_)));

        let err = v
            .validate_storage(Box::new(MemoryCrate::new("mem")), &ValidationRequest::new("mem"))
            .unwrap_err();
        assert!(matches!(err, ValidatorError::ProfileNotFound(_)));
    }

    #[test]
    fn test_profile_detected_from_conforms_to() {
        let mut p = Profile::new("p");
        p.uri = Some("https://example.org/profile/p".into());
        let v = validator(vec![p]);
        let meta = r#"{"@context": "x", "@graph": [
            {"@id": "ro-crate-metadata.json", "about": {"@id": "./"}},
            {"@id": "./", "@type": "Dataset", "conformsTo": {"@id": "https://example.org/profile/p/"}}]}"#;
        let r = v
            .validate_storage(
                Box::new(MemoryCrate::new("mem").with_file(DESCRIPTOR_FILE, meta)),
                &ValidationRequest::new("mem"),
            )
            .unwrap();
        assert_eq!(r.profile, "p");

        let fallback = validator(vec![Profile::new("q")]).with_default_profile("q");
        let r = fallback
            .validate_storage(Box::new(MemoryCrate::new("mem")), &ValidationRequest::new("mem"))
            .unwrap();
        assert_eq!(r.profile, "q");
    }

    #[test]
    fn test_validate_many_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let v = sample();
        let requests = vec![
            ValidationRequest::new(dir.path().to_string_lossy()).profile("p"),
            ValidationRequest::new(dir.path().join("missing").to_string_lossy()).profile("p"),
        ];
        let results = v.validate_many(&requests);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ValidatorError::Storage(_))));
    }

    const NAMELESS_ROOT: &str = r#"{"@context": "x", "@graph": [
        {"@id": "ro-crate-metadata.json", "about": {"@id": "./"}},
        {"@id": "./", "@type": "Dataset"}]}"#;

    struct OfflineEngine;

    impl ConformanceEngine for OfflineEngine {
        fn validate(
            &self,
            _: &[Shape],
            _: &MetadataGraph,
            _: &EngineOptions<'_>,
        ) -> Result<ConformanceReport, EngineError> {
            Err(EngineError::Failed("engine offline".into()))
        }
    }

    fn root_name(engine_severity: Option<&str>) -> Check {
        let mut prop = PropertyConstraint::new("root-name", "name");
        prop.min_count = Some(1);
        prop.severity = engine_severity.map(str::to_string);
        let shape = Shape {
            name: "Root".into(),
            target: ShapeTarget::RootDataEntity,
            properties: vec![prop],
        };
        Check::shape("root-name", "Root name", "", Severity::Recommended, shape)
    }

    fn nameless_crate() -> Box<dyn CrateStorage> {
        Box::new(MemoryCrate::new("mem").with_file(DESCRIPTOR_FILE, NAMELESS_ROOT))
    }

    #[test]
    fn test_engine_failure_is_errored_with_diagnostic() {
        let p = Profile::new("p").with_requirement(req(
            "p",
            "Root",
            Severity::Recommended,
            vec![root_name(None)],
        ));
        let v = validator(vec![p]).with_engine(Arc::new(OfflineEngine));
        let request = ValidationRequest::new("mem")
            .profile("p")
            .severity(Severity::Recommended);
        let r = v.validate_storage(nameless_crate(), &request).unwrap();

        assert_eq!(r.outcomes.len(), 1);
        assert_eq!(r.outcomes[0].status, CheckStatus::Errored);
        let errs = r.execution_errors();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, IssueKind::ExecutionError);
        assert!(errs[0].message.contains("engine offline"));
        assert_eq!(r.failed_requirements().len(), 1);
        assert!(!r.passed(Severity::Recommended));
    }

    #[test]
    fn test_undeclared_engine_severity_takes_requirement_severity() {
        let p = Profile::new("p")
            .with_requirement(req(
                "p",
                "Root",
                Severity::Recommended,
                vec![root_name(None)],
            ))
            .with_requirement(req(
                "p",
                "Root (info)",
                Severity::Recommended,
                vec![root_name(Some("sh:Info"))],
            ));
        let request = ValidationRequest::new("mem")
            .profile("p")
            .severity(Severity::Optional);
        let r = validator(vec![p])
            .validate_storage(nameless_crate(), &request)
            .unwrap();

        assert_eq!(r.issues.len(), 2);
        assert_eq!(r.issues[0].requirement, "Root");
        assert_eq!(r.issues[0].severity, Severity::Recommended);
        assert_eq!(r.issues[1].severity, Severity::Optional);
    }

    #[test]
    fn test_same_name_requirements_are_reported_separately() {
        let p = Profile::new("p")
            .with_requirement(req(
                "p",
                "R",
                Severity::Required,
                vec![check("r-pass", Severity::Required, pass)],
            ))
            .with_requirement(req(
                "p",
                "R",
                Severity::Optional,
                vec![check("r-fail", Severity::Optional, fail)],
            ));
        let r = run(
            &validator(vec![p]),
            &ValidationRequest::new("mem").profile("p").severity(Severity::Optional),
        );

        assert_eq!(r.requirements.len(), 2);
        let failed = r.failed_requirements();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].severity, Severity::Optional);
        assert_eq!(r.issues_of(failed[0].index).len(), 1);
        assert!(r.passed(Severity::Required));
    }
}
