//! Profiles and the profile directory loader.
//!
//! Layout of a profile root:
//!
//! ```text
//! <root>/
//!   ro-crate/
//!     profile.toml            # optional manifest (identifier, parent, uri...)
//!     must/*.toml             # REQUIRED-tier rule files
//!     should/*.toml           # RECOMMENDED-tier rule files
//!     may/*.yaml              # OPTIONAL-tier rule files
//!   workflow-ro-crate/
//!     profile.toml            # inherits = "ro-crate"
//!     ...
//! ```
//!
//! Rule files declare `[[shape]]` graph constraints (one requirement per
//! shape, one check per property constraint) and `[[requirement]]`
//! predicate groups (one requirement per group, checks resolved through the
//! [`PredicateRegistry`]). Any malformed declaration fails the whole load
//! with the offending file named.
//!
//! Severity precedence: check `level` > requirement/shape `level` > tier
//! folder > REQUIRED.

use crate::checks::{Check, PredicateRegistry};
use crate::engine::{Datatype, PropertyConstraint, Shape, ShapeTarget};
use crate::error::ValidatorError;
use crate::models::declaration::{
    ProfileManifest, PropertyDecl, RequirementDecl, RuleFile, ShapeDecl,
};
use crate::models::Severity;
use crate::requirement::{Requirement, RequirementKind};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Manifest file name inside a profile directory.
pub const MANIFEST_FILE: &str = "profile.toml";

#[derive(Debug, Clone)]
/// A named, versioned rule-set. Immutable once loaded.
pub struct Profile {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    pub uri: Option<String>,
    pub parent: Option<String>,
    pub path: PathBuf,
    requirements: Vec<Arc<Requirement>>,
}

impl Profile {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Profile {
            name: identifier.clone(),
            identifier,
            description: String::new(),
            version: None,
            uri: None,
            parent: None,
            path: PathBuf::new(),
            requirements: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Append a requirement; its declaring profile must be this one.
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        debug_assert_eq!(requirement.profile(), self.identifier);
        self.requirements.push(Arc::new(requirement));
        self
    }

    /// Requirements in declaration order.
    pub fn requirements(&self) -> &[Arc<Requirement>] {
        &self.requirements
    }

    /// Number of checks per severity across this profile's own requirements.
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.requirements {
            for c in r.checks() {
                *counts.entry(c.severity()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// A rule file that has already been read.
pub(crate) struct RuleSource {
    /// Path reported in errors.
    pub path: PathBuf,
    /// Path relative to the profile directory.
    pub rel: PathBuf,
    pub text: String,
}

/// Load every profile found directly under `root`.
///
/// Profiles are returned sorted by identifier.
pub fn load_profiles(
    root: &Path,
    predicates: &PredicateRegistry,
) -> Result<Vec<Profile>, ValidatorError> {
    if !root.is_dir() {
        return Err(ValidatorError::ProfilesDirectoryNotFound(root.to_path_buf()));
    }
    let entries = fs::read_dir(root)
        .map_err(|_| ValidatorError::ProfilesDirectoryNotFound(root.to_path_buf()))?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && !is_hidden(p))
        .collect();
    dirs.sort();

    let mut profiles: Vec<Profile> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let profile = load_profile(&dir, predicates)?;
        if let Some(existing) = profiles.iter().find(|p| p.identifier == profile.identifier) {
            return Err(ValidatorError::InvalidProfilePath {
                path: dir.clone(),
                reason: format!(
                    "profile identifier `{}` is already declared by {}",
                    profile.identifier,
                    existing.path.display()
                ),
            });
        }
        profiles.push(profile);
    }
    profiles.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    tracing::debug!(root = %root.display(), count = profiles.len(), "loaded profiles");
    Ok(profiles)
}

/// Load one profile directory.
pub fn load_profile(
    dir: &Path,
    predicates: &PredicateRegistry,
) -> Result<Profile, ValidatorError> {
    if !dir.is_dir() {
        return Err(ValidatorError::InvalidProfilePath {
            path: dir.to_path_buf(),
            reason: "not a directory".into(),
        });
    }
    let dir_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ValidatorError::InvalidProfilePath {
            path: dir.to_path_buf(),
            reason: "directory name is not valid UTF-8".into(),
        })?
        .to_string();

    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = if manifest_path.is_file() {
        Some(fs::read_to_string(&manifest_path).map_err(|e| malformed(&manifest_path, e))?)
    } else {
        None
    };
    let mut sources = Vec::new();
    for file in rule_files(dir)? {
        let text = fs::read_to_string(&file).map_err(|e| malformed(&file, e))?;
        let rel = pathdiff::diff_paths(&file, dir).unwrap_or_else(|| file.clone());
        sources.push(RuleSource {
            path: file,
            rel,
            text,
        });
    }
    assemble_profile(dir, dir_name, manifest.as_deref(), sources, predicates)
}

/// Build a profile from its manifest text and rule files.
///
/// `dir` is only used to report locations; nothing is read from disk.
pub(crate) fn assemble_profile(
    dir: &Path,
    dir_name: String,
    manifest: Option<&str>,
    sources: Vec<RuleSource>,
    predicates: &PredicateRegistry,
) -> Result<Profile, ValidatorError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest: ProfileManifest = match manifest {
        Some(s) => toml::from_str(s).map_err(|e| malformed(&manifest_path, e))?,
        None => ProfileManifest::default(),
    };

    let identifier = manifest.identifier.clone().unwrap_or(dir_name);
    if identifier.trim().is_empty() {
        return Err(malformed(&manifest_path, "profile identifier is empty"));
    }
    let mut profile = Profile::new(identifier.clone());
    profile.name = manifest.name.clone().unwrap_or_else(|| identifier.clone());
    profile.description = manifest.description.clone().unwrap_or_default();
    profile.version = manifest.version.clone();
    profile.uri = manifest.uri.clone();
    profile.parent = manifest.inherits.clone();
    profile.path = dir.to_path_buf();

    if profile.parent.as_deref() == Some(identifier.as_str()) {
        return Err(ValidatorError::InheritanceCycle(identifier));
    }

    for source in sources {
        let file = source.path;
        let source_key = source
            .rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        let tier = tier_of(&source.rel);
        let parsed = parse_rule_file(&file, &source.text)?;
        let mut position = 0usize;
        for decl in parsed.shape {
            let req = build_shape_requirement(
                &profile.identifier,
                &file,
                &source_key,
                tier,
                position,
                decl,
            )?;
            profile.requirements.push(Arc::new(req));
            position += 1;
        }
        for decl in parsed.requirement {
            let req = build_predicate_requirement(
                &profile.identifier,
                &file,
                &source_key,
                tier,
                position,
                decl,
                predicates,
            )?;
            profile.requirements.push(Arc::new(req));
            position += 1;
        }
    }

    // Two requirements with the same identity inside one profile are as
    // ambiguous as across an inheritance chain.
    let mut seen = BTreeMap::new();
    for r in &profile.requirements {
        if let Some(prev) = seen.insert(r.identity(), r.source_key().to_string()) {
            return Err(ValidatorError::DuplicateRequirementCheck {
                requirement: r.name().to_string(),
                first: format!("{} ({})", profile.identifier, prev),
                second: format!("{} ({})", profile.identifier, r.source_key()),
            });
        }
    }

    tracing::debug!(
        profile = %profile.identifier,
        requirements = profile.requirements.len(),
        parent = profile.parent.as_deref().unwrap_or("-"),
        "loaded profile"
    );
    Ok(profile)
}

fn is_hidden(p: &Path) -> bool {
    p.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn malformed(path: &Path, reason: impl ToString) -> ValidatorError {
    ValidatorError::MalformedRuleDeclaration {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Rule files below a profile directory, sorted by path.
fn rule_files(dir: &Path) -> Result<Vec<PathBuf>, ValidatorError> {
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let paths = glob::glob(&pattern).map_err(|e| ValidatorError::InvalidProfilePath {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| ValidatorError::InvalidProfilePath {
            path: e.path().to_path_buf(),
            reason: e.to_string(),
        })?;
        if !path.is_file() {
            continue;
        }
        let rel = pathdiff::diff_paths(&path, dir).unwrap_or_else(|| path.clone());
        if rel == Path::new(MANIFEST_FILE) {
            continue;
        }
        let hidden = rel
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
        if hidden {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") | Some("yaml") | Some("yml") => files.push(path),
            _ => tracing::trace!(file = %path.display(), "ignoring non-rule file"),
        }
    }
    files.sort();
    Ok(files)
}

/// Severity implied by the first folder of a profile-relative path.
fn tier_of(rel: &Path) -> Option<Severity> {
    let mut comps = rel.components();
    let first = comps.next()?;
    // A file directly in the profile directory has no tier folder.
    comps.next()?;
    Severity::from_tier_folder(&first.as_os_str().to_string_lossy())
}

fn parse_rule_file(path: &Path, s: &str) -> Result<RuleFile, ValidatorError> {
    let parsed: RuleFile = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(s).map_err(|e| malformed(path, e))?,
        _ => {
            if s.trim().is_empty() {
                RuleFile::default()
            } else {
                serde_yaml::from_str(s).map_err(|e| malformed(path, e))?
            }
        }
    };
    if parsed.shape.is_empty() && parsed.requirement.is_empty() {
        return Err(malformed(path, "file declares no shapes and no requirements"));
    }
    Ok(parsed)
}

fn explicit_level(path: &Path, level: Option<&str>) -> Result<Option<Severity>, ValidatorError> {
    match level {
        None => Ok(None),
        Some(l) => Severity::from_name(l)
            .map(Some)
            .map_err(|e| malformed(path, e)),
    }
}

fn build_shape_requirement(
    profile: &str,
    file: &Path,
    source_key: &str,
    tier: Option<Severity>,
    position: usize,
    decl: ShapeDecl,
) -> Result<Requirement, ValidatorError> {
    let req_severity = explicit_level(file, decl.level.as_deref())?
        .or(tier)
        .unwrap_or(Severity::Required);

    let mut targets: Vec<ShapeTarget> = Vec::new();
    if let Some(n) = &decl.target_node {
        targets.push(ShapeTarget::Node(n.clone()));
    }
    if let Some(c) = &decl.target_class {
        targets.push(ShapeTarget::Class(c.clone()));
    }
    if decl.root {
        targets.push(ShapeTarget::RootDataEntity);
    }
    if decl.descriptor {
        targets.push(ShapeTarget::Descriptor);
    }
    if targets.len() != 1 {
        return Err(malformed(
            file,
            format!(
                "shape `{}` must declare exactly one of target_node, target_class, root, descriptor",
                decl.name
            ),
        ));
    }
    let target = targets.remove(0);
    if decl.property.is_empty() {
        return Err(malformed(
            file,
            format!("shape `{}` declares no property constraints", decl.name),
        ));
    }

    let mut builder = Requirement::builder(profile, decl.name.clone())
        .description(decl.description.clone().unwrap_or_default())
        .severity(req_severity)
        .kind(RequirementKind::Shape)
        .source(file, source_key)
        .position(position);
    let mut checks_meta = Vec::with_capacity(decl.property.len());
    let mut shape = Shape {
        name: decl.name.clone(),
        target,
        properties: Vec::with_capacity(decl.property.len()),
    };
    for prop in decl.property {
        let check_severity =
            explicit_level(file, prop.level.as_deref())?.unwrap_or(req_severity);
        let name = prop
            .name
            .clone()
            .unwrap_or_else(|| format!("{}: {}", decl.name, prop.path));
        let description = prop.description.clone().unwrap_or_default();
        checks_meta.push((prop.id.clone(), name, description, check_severity));
        shape.properties.push(property_constraint(file, &decl.name, prop)?);
    }
    // One check per property constraint, each evaluating its own fragment.
    for ((id, name, description, severity), constraint) in
        checks_meta.into_iter().zip(&shape.properties)
    {
        let fragment = shape.fragment(constraint);
        builder = builder.check(Check::shape(id, name, description, severity, fragment));
    }
    builder.build()
}

fn property_constraint(
    file: &Path,
    shape: &str,
    prop: PropertyDecl,
) -> Result<PropertyConstraint, ValidatorError> {
    if prop.id.trim().is_empty() {
        return Err(malformed(file, format!("shape `{}` has a property without id", shape)));
    }
    if prop.path.trim().is_empty() {
        return Err(malformed(
            file,
            format!("property `{}` of shape `{}` has an empty path", prop.id, shape),
        ));
    }
    let mut c = PropertyConstraint::new(prop.id.clone(), prop.path.clone());
    c.min_count = prop.min_count;
    c.max_count = prop.max_count;
    if let (Some(min), Some(max)) = (c.min_count, c.max_count) {
        if min > max {
            return Err(malformed(
                file,
                format!("property `{}`: min_count {} exceeds max_count {}", prop.id, min, max),
            ));
        }
    }
    if let Some(dt) = &prop.datatype {
        c.datatype = Some(Datatype::parse(dt).ok_or_else(|| {
            malformed(file, format!("property `{}`: unknown datatype `{}`", prop.id, dt))
        })?);
    }
    if let Some(p) = &prop.pattern {
        c.pattern = Some(Regex::new(p).map_err(|e| {
            malformed(file, format!("property `{}`: invalid pattern: {}", prop.id, e))
        })?);
    }
    c.class = prop.class;
    c.has_value = prop.has_value;
    c.in_values = prop.in_values;
    c.message = prop.message;
    c.severity = prop.severity;
    Ok(c)
}

fn build_predicate_requirement(
    profile: &str,
    file: &Path,
    source_key: &str,
    tier: Option<Severity>,
    position: usize,
    decl: RequirementDecl,
    predicates: &PredicateRegistry,
) -> Result<Requirement, ValidatorError> {
    let req_severity = explicit_level(file, decl.level.as_deref())?
        .or(tier)
        .unwrap_or(Severity::Required);
    if decl.check.is_empty() {
        return Err(malformed(
            file,
            format!("requirement `{}` declares no checks", decl.name),
        ));
    }
    let mut builder = Requirement::builder(profile, decl.name.clone())
        .description(decl.description.unwrap_or_default())
        .severity(req_severity)
        .kind(RequirementKind::Predicate)
        .source(file, source_key)
        .position(position);
    for c in decl.check {
        if c.id.trim().is_empty() {
            return Err(malformed(
                file,
                format!("requirement `{}` has a check without id", decl.name),
            ));
        }
        let func = predicates.get(&c.function).ok_or_else(|| {
            malformed(
                file,
                format!("check `{}`: unknown predicate function `{}`", c.id, c.function),
            )
        })?;
        let severity = explicit_level(file, c.level.as_deref())?.unwrap_or(req_severity);
        let name = c.name.unwrap_or_else(|| c.id.clone());
        builder = builder.check(Check::predicate(
            c.id,
            name,
            c.description.unwrap_or_default(),
            severity,
            c.function,
            func,
        ));
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckKind;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, body).unwrap();
    }

    const PREDICATES: &str = r#"
[[requirement]]
name = "File Descriptor existence"
[[requirement.check]]
id = "descriptor-exists"
function = "rocrate.file_descriptor_exists"
[[requirement.check]]
id = "descriptor-size"
function = "rocrate.file_descriptor_not_empty"
level = "SHOULD"
"#;

    const SHAPES: &str = r#"
[[shape]]
name = "Root Data Entity"
root = true
[[shape.property]]
id = "root-name"
path = "name"
min_count = 1
datatype = "string"
"#;

    #[test]
    fn test_tier_folders_and_precedence() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("base");
        write(&p, "must/0_descriptor.toml", PREDICATES);
        write(&p, "should/root.toml", SHAPES);
        write(&p, "README.md", "ignored");
        let prof = load_profile(&p, &PredicateRegistry::with_builtins()).unwrap();
        assert_eq!(prof.identifier, "base");
        assert_eq!(prof.requirements().len(), 2);

        let desc = &prof.requirements()[0];
        assert_eq!(desc.severity(), Severity::Required);
        assert_eq!(desc.source_key(), "must/0_descriptor.toml");
        assert_eq!(desc.checks()[0].severity(), Severity::Required);
        // Explicit check level wins over the tier folder.
        assert_eq!(desc.checks()[1].severity(), Severity::Recommended);

        let root = &prof.requirements()[1];
        assert_eq!(root.severity(), Severity::Recommended);
        assert!(matches!(root.checks()[0].kind(), CheckKind::Shape(_)));
    }

    #[test]
    fn test_manifest_sets_identity_and_parent() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("wf");
        write(
            &p,
            "profile.toml",
            "identifier = \"workflow\"\nname = \"Workflow\"\nversion = \"1.0\"\ninherits = \"base\"\n",
        );
        write(&p, "must/a.yaml", "requirement:\n  - name: R\n    check:\n      - id: c\n        function: rocrate.file_descriptor_exists\n");
        let prof = load_profile(&p, &PredicateRegistry::with_builtins()).unwrap();
        assert_eq!(prof.identifier, "workflow");
        assert_eq!(prof.parent.as_deref(), Some("base"));
        assert_eq!(prof.version.as_deref(), Some("1.0"));
        assert_eq!(prof.requirements().len(), 1);
    }

    #[test]
    fn test_malformed_declarations_name_the_file() {
        let cases = [
            ("must/bad.toml", "[[requirement]\nname="),
            (
                "must/unknown_fn.toml",
                "[[requirement]]\nname = \"R\"\n[[requirement.check]]\nid = \"x\"\nfunction = \"nope\"\n",
            ),
            (
                "must/no_target.toml",
                "[[shape]]\nname = \"S\"\n[[shape.property]]\nid = \"x\"\npath = \"name\"\n",
            ),
            (
                "must/bad_regex.toml",
                "[[shape]]\nname = \"S\"\nroot = true\n[[shape.property]]\nid = \"x\"\npath = \"name\"\npattern = \"(\"\n",
            ),
            (
                "must/bad_level.toml",
                "[[requirement]]\nname = \"R\"\nlevel = \"URGENT\"\n[[requirement.check]]\nid = \"x\"\nfunction = \"rocrate.file_descriptor_exists\"\n",
            ),
        ];
        for (rel, body) in cases {
            let dir = tempdir().unwrap();
            let p = dir.path().join("base");
            write(&p, rel, body);
            match load_profile(&p, &PredicateRegistry::with_builtins()) {
                Err(ValidatorError::MalformedRuleDeclaration { path, .. }) => {
                    assert!(path.ends_with(rel), "{} named {:?}", rel, path)
                }
                other => panic!("{}: unexpected {:?}", rel, other.map(|p| p.identifier)),
            }
        }
    }

    #[test]
    fn test_duplicate_check_ids_rejected_at_load() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("base");
        write(
            &p,
            "must/dup.toml",
            "[[requirement]]\nname = \"R\"\n[[requirement.check]]\nid = \"x\"\nfunction = \"rocrate.file_descriptor_exists\"\n[[requirement.check]]\nid = \"x\"\nfunction = \"rocrate.file_descriptor_not_empty\"\n",
        );
        assert!(matches!(
            load_profile(&p, &PredicateRegistry::with_builtins()),
            Err(ValidatorError::DuplicateCheckIdentifier { .. })
        ));
    }

    #[test]
    fn test_duplicate_requirement_identity_rejected_at_load() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("base");
        let body = "[[requirement]]\nname = \"R\"\n[[requirement.check]]\nid = \"x\"\nfunction = \"rocrate.file_descriptor_exists\"\n";
        write(&p, "must/a.toml", body);
        write(&p, "should/b.toml", body);
        match load_profile(&p, &PredicateRegistry::with_builtins()) {
            Err(ValidatorError::DuplicateRequirementCheck {
                requirement,
                first,
                second,
            }) => {
                assert_eq!(requirement, "R");
                assert!(first.contains("must/a.toml"), "{}", first);
                assert!(second.contains("should/b.toml"), "{}", second);
            }
            other => panic!("unexpected {:?}", other.map(|p| p.identifier)),
        }

        // Same name with different checks is a different requirement.
        write(&p, "should/b.toml", &body.replace("\"x\"", "\"y\""));
        let prof = load_profile(&p, &PredicateRegistry::with_builtins()).unwrap();
        assert_eq!(prof.requirements().len(), 2);
    }

    #[test]
    fn test_shape_property_without_engine_severity() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("base");
        write(&p, "may/root.toml", SHAPES);
        let prof = load_profile(&p, &PredicateRegistry::new()).unwrap();
        match prof.requirements()[0].checks()[0].kind() {
            CheckKind::Shape(fragment) => assert_eq!(fragment.properties[0].severity, None),
            _ => panic!("expected a shape check"),
        }
    }

    #[test]
    fn test_load_profiles_root_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_profiles(&dir.path().join("missing"), &PredicateRegistry::new()),
            Err(ValidatorError::ProfilesDirectoryNotFound(_))
        ));

        write(dir.path(), "a/profile.toml", "identifier = \"same\"\n");
        write(dir.path(), "b/profile.toml", "identifier = \"same\"\n");
        write(dir.path(), ".hidden/profile.toml", "identifier = \"other\"\n");
        assert!(matches!(
            load_profiles(dir.path(), &PredicateRegistry::new()),
            Err(ValidatorError::InvalidProfilePath { .. })
        ));
    }

    #[test]
    fn test_severity_counts() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("base");
        write(&p, "must/0_descriptor.toml", PREDICATES);
        let prof = load_profile(&p, &PredicateRegistry::with_builtins()).unwrap();
        let counts = prof.severity_counts();
        assert_eq!(counts.get(&Severity::Required), Some(&1));
        assert_eq!(counts.get(&Severity::Recommended), Some(&1));
    }
}
