//! Output rendering for validation results and profile listings.
//!
//! Supports `human` (default) and `json` outputs. The JSON form of a
//! validation run carries the verdict, failed requirements, issues,
//! per-check outcomes, and a summary.

use crate::models::{CheckStatus, IssueKind, Severity, ValidationResult};
use crate::profile::Profile;
use crate::resolver::ProfileDescription;
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;
use std::sync::Arc;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

fn paint(s: &str, color: bool, f: impl Fn(&str) -> String) -> String {
    if color {
        f(s)
    } else {
        s.to_string()
    }
}

fn severity_tag(sev: Severity, color: bool) -> String {
    let tag = format!("⟦{}⟧", sev.name());
    match sev {
        Severity::Required => paint(&tag, color, |s| s.red().bold().to_string()),
        Severity::Recommended => paint(&tag, color, |s| s.yellow().bold().to_string()),
        Severity::Optional => paint(&tag, color, |s| s.blue().bold().to_string()),
    }
}

/// Print one validation result in the requested format.
pub fn print_result(res: &ValidationResult, output: &str) -> serde_json::Result<()> {
    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&compose_result_json(res)?)?);
        return Ok(());
    }
    let color = use_colors(output);
    println!(
        "{} {} against {} ({}) at {}",
        paint("Validating", color, |s| s.bold().to_string()),
        res.crate_location,
        res.profile,
        res.profile_chain.join(" → "),
        res.severity
    );
    for req in res.failed_requirements() {
        println!(
            "{} {} {} ❲{}❳",
            paint("✖", color, |s| s.red().to_string()),
            severity_tag(req.severity, color),
            req.profile,
            paint(&req.name, color, |s| s.bold().to_string())
        );
        for is in res.issues_of(req.index) {
            let icon = match is.kind {
                IssueKind::Violation => "•",
                IssueKind::ExecutionError => "⚠",
            };
            let mut line = format!("    {} [{}] {}", icon, is.check, is.message);
            if let Some(focus) = &is.focus_node {
                line.push_str(&format!(" (node: {}", focus));
                if let Some(path) = &is.path {
                    line.push_str(&format!(", path: {}", path));
                }
                line.push(')');
            }
            println!("{}", line);
        }
    }
    for o in &res.outcomes {
        if let CheckStatus::NotEvaluated(reason) = &o.status {
            println!(
                "{} {} ❲{}❳ [{}] not evaluated — {}",
                paint("◌", color, |s| s.bright_black().to_string()),
                o.profile,
                o.requirement,
                o.check,
                reason
            );
        }
    }
    if let Some(reason) = res.aborted {
        let msg = format!("run aborted early: {:?}", reason);
        println!("{}", paint(&msg, color, |s| s.yellow().to_string()));
    }
    let s = res.summary();
    let summary = format!(
        "— Summary — requirements={} failed={} checks={} passed={} failed={} errored={} not_evaluated={} skipped={} issues={}",
        s.requirements,
        s.failed_requirements,
        s.checks,
        s.passed,
        s.failed,
        s.errored,
        s.not_evaluated,
        s.skipped,
        s.issues
    );
    println!("{}", paint(&summary, color, |s| s.bold().to_string()));
    if res.passed_at_run_severity() {
        println!("{}", paint("PASSED", color, |s| s.green().bold().to_string()));
    } else {
        println!("{}", paint("FAILED", color, |s| s.red().bold().to_string()));
    }
    Ok(())
}

/// Print the profile listing.
pub fn print_profiles(profiles: &[&Arc<Profile>], output: &str) -> serde_json::Result<()> {
    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&compose_profiles_json(profiles))?);
        return Ok(());
    }
    let color = use_colors(output);
    for p in profiles {
        let checks: usize = p.requirements().iter().map(|r| r.checks().len()).sum();
        let mut line = format!(
            "{} {}",
            paint(&p.identifier, color, |s| s.bold().to_string()),
            p.name
        );
        if let Some(v) = &p.version {
            line.push_str(&format!(" v{}", v));
        }
        if let Some(parent) = &p.parent {
            line.push_str(&format!(" (inherits {})", parent));
        }
        line.push_str(&format!(
            " — requirements={} checks={}",
            p.requirements().len(),
            checks
        ));
        println!("{}", line);
    }
    Ok(())
}

/// Print a profile description.
pub fn print_description(d: &ProfileDescription, output: &str) -> serde_json::Result<()> {
    if output == "json" {
        println!("{}", serde_json::to_string_pretty(d)?);
        return Ok(());
    }
    let color = use_colors(output);
    println!("{} {}", paint(&d.identifier, color, |s| s.bold().to_string()), d.name);
    if !d.description.is_empty() {
        println!("  {}", d.description);
    }
    if let Some(uri) = &d.uri {
        println!("  uri: {}", uri);
    }
    println!("  chain: {}", d.chain.join(" → "));
    let counts: Vec<String> = Severity::ALL
        .iter()
        .rev()
        .map(|s| format!("{}={}", s.name(), d.severity_counts.get(s).copied().unwrap_or(0)))
        .collect();
    println!("  checks: {}", counts.join(" "));
    for r in &d.requirements {
        println!(
            "{} {} ❲{}❳ ({})",
            severity_tag(r.severity, color),
            r.profile,
            r.name,
            r.source
        );
        for c in &r.checks {
            println!("    - {} [{}] {} ({})", c.id, c.severity, c.name, c.kind);
        }
    }
    Ok(())
}

/// Compose the result JSON object (pure) for testing/snapshot purposes.
pub fn compose_result_json(res: &ValidationResult) -> serde_json::Result<JsonVal> {
    Ok(json!({
        "crate": res.crate_location,
        "profile": res.profile,
        "profile_chain": res.profile_chain,
        "severity": res.severity,
        "passed": res.passed_at_run_severity(),
        "aborted": res.aborted,
        "failed_requirements": res.failed_requirements(),
        "issues": serde_json::to_value(&res.issues)?,
        "checks": serde_json::to_value(&res.outcomes)?,
        "summary": res.summary(),
    }))
}

/// Compose the profile listing JSON (pure).
pub fn compose_profiles_json(profiles: &[&Arc<Profile>]) -> JsonVal {
    let items: Vec<_> = profiles
        .iter()
        .map(|p| {
            json!({
                "identifier": p.identifier,
                "name": p.name,
                "version": p.version,
                "uri": p.uri,
                "parent": p.parent,
                "requirements": p.requirements().len(),
                "checks": p.requirements().iter().map(|r| r.checks().len()).sum::<usize>(),
            })
        })
        .collect();
    json!({ "profiles": items, "total": profiles.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckOutcome, Issue, RequirementRef};
    use crate::requirement::testing::requirement;

    fn sample() -> ValidationResult {
        let chain = vec!["ro-crate".into()];
        let mut r = ValidationResult::new("crate", "ro-crate", chain, Severity::Required);
        r.requirements.push(RequirementRef {
            index: 0,
            profile: "ro-crate".into(),
            name: "File Descriptor existence".into(),
            severity: Severity::Required,
        });
        r.outcomes.push(CheckOutcome {
            profile: "ro-crate".into(),
            requirement: "File Descriptor existence".into(),
            requirement_index: 0,
            check: "descriptor-exists".into(),
            check_name: "descriptor-exists".into(),
            severity: Severity::Required,
            status: CheckStatus::Failed,
        });
        r.issues.push(Issue {
            profile: "ro-crate".into(),
            requirement: "File Descriptor existence".into(),
            requirement_index: 0,
            check: "descriptor-exists".into(),
            check_name: "descriptor-exists".into(),
            check_severity: Severity::Required,
            severity: Severity::Required,
            kind: IssueKind::Violation,
            message: "missing".into(),
            focus_node: None,
            path: None,
            value: None,
        });
        r
    }

    #[test]
    fn test_compose_result_json_shape() {
        let out = compose_result_json(&sample()).unwrap();
        assert_eq!(out["passed"], false);
        assert_eq!(out["severity"], "REQUIRED");
        assert_eq!(out["failed_requirements"][0]["name"], "File Descriptor existence");
        assert_eq!(out["failed_requirements"][0]["index"], 0);
        assert_eq!(out["issues"][0]["kind"], "violation");
        assert_eq!(out["checks"][0]["status"], "failed");
        assert_eq!(out["summary"]["failed"], 1);
        assert!(out["aborted"].is_null());
    }

    #[test]
    fn test_compose_profiles_json() {
        let p = Arc::new(
            Profile::new("ro-crate")
                .with_requirement(requirement("ro-crate", "R", Severity::Required, &["a", "b"])),
        );
        let out = compose_profiles_json(&[&p]);
        assert_eq!(out["total"], 1);
        assert_eq!(out["profiles"][0]["identifier"], "ro-crate");
        assert_eq!(out["profiles"][0]["checks"], 2);
        assert!(out["profiles"][0]["parent"].is_null());
    }
}
