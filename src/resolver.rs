//! Profile registry and inheritance resolution.
//!
//! - `ProfileRegistry`: every loaded profile keyed by identifier, with
//!   parent links validated once at construction
//! - `resolve`: flatten a profile chain into the ordered requirement list of
//!   a run
//! - `describe` / `list`: read-only views for the CLI

use crate::bundled::load_bundled;
use crate::checks::PredicateRegistry;
use crate::error::ValidatorError;
use crate::models::Severity;
use crate::profile::{load_profiles, Profile};
use crate::requirement::{Requirement, RequirementIdentity};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
/// Requirements of a profile chain, ready to execute.
pub struct ResolvedProfile {
    /// Target profile first, then its ancestors (only the target when
    /// inheritance is disabled).
    pub chain: Vec<Arc<Profile>>,
    /// Sorted by severity desc, source path, name.
    pub requirements: Vec<Arc<Requirement>>,
}

impl ResolvedProfile {
    pub fn chain_ids(&self) -> Vec<String> {
        self.chain.iter().map(|p| p.identifier.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementSummary {
    pub profile: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub source: String,
    pub checks: Vec<CheckSummary>,
}

#[derive(Debug, Clone, Serialize)]
/// Metadata and effective requirements of one profile.
pub struct ProfileDescription {
    pub identifier: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub chain: Vec<String>,
    pub severity_counts: BTreeMap<Severity, usize>,
    pub requirements: Vec<RequirementSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    root: Option<PathBuf>,
    profiles: BTreeMap<String, Arc<Profile>>,
}

impl ProfileRegistry {
    /// Load every profile below `root`.
    pub fn load(root: &Path, predicates: &PredicateRegistry) -> Result<Self, ValidatorError> {
        let profiles = load_profiles(root, predicates)?;
        let mut reg = Self::from_profiles(profiles)?;
        reg.root = Some(root.to_path_buf());
        Ok(reg)
    }

    /// Registry of the profiles embedded in the binary.
    pub fn bundled(predicates: &PredicateRegistry) -> Result<Self, ValidatorError> {
        Self::from_profiles(load_bundled(predicates)?)
    }

    /// Build a registry from already-loaded profiles.
    ///
    /// Every declared parent must exist and the parent links must be acyclic.
    pub fn from_profiles(profiles: Vec<Profile>) -> Result<Self, ValidatorError> {
        let mut map: BTreeMap<String, Arc<Profile>> = BTreeMap::new();
        for p in profiles {
            if map.contains_key(&p.identifier) {
                return Err(ValidatorError::InvalidProfilePath {
                    path: p.path.clone(),
                    reason: format!("profile identifier `{}` is declared twice", p.identifier),
                });
            }
            map.insert(p.identifier.clone(), Arc::new(p));
        }
        for p in map.values() {
            if let Some(parent) = &p.parent {
                if !map.contains_key(parent) {
                    return Err(ValidatorError::ProfileNotFound(format!(
                        "{} (parent of {})",
                        parent, p.identifier
                    )));
                }
            }
        }
        let reg = ProfileRegistry { root: None, profiles: map };
        for id in reg.profiles.keys() {
            reg.walk(id)?;
        }
        Ok(reg)
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn get(&self, id: &str) -> Result<&Arc<Profile>, ValidatorError> {
        self.profiles
            .get(id)
            .ok_or_else(|| ValidatorError::ProfileNotFound(id.to_string()))
    }

    /// All profiles, ordered by identifier.
    pub fn list(&self) -> Vec<&Arc<Profile>> {
        self.profiles.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn walk(&self, id: &str) -> Result<Vec<Arc<Profile>>, ValidatorError> {
        let mut out: Vec<Arc<Profile>> = Vec::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut cur = Some(id);
        while let Some(cid) = cur {
            if !seen.insert(cid) {
                let path: Vec<&str> = out.iter().map(|p| p.identifier.as_str()).collect();
                return Err(ValidatorError::InheritanceCycle(format!(
                    "{} -> {}",
                    path.join(" -> "),
                    cid
                )));
            }
            let p = self.get(cid)?;
            out.push(p.clone());
            cur = p.parent.as_deref();
        }
        Ok(out)
    }

    /// Profile chain of `id`, child first. Only `id` itself when `inherit`
    /// is false.
    pub fn chain(&self, id: &str, inherit: bool) -> Result<Vec<Arc<Profile>>, ValidatorError> {
        if inherit {
            self.walk(id)
        } else {
            Ok(vec![self.get(id)?.clone()])
        }
    }

    /// Flatten the requirements of `id` (and its ancestors when `inherit`).
    ///
    /// Two requirements with the same identity in different profiles of
    /// the chain are a `DuplicateRequirementCheck` unless `allow_override`
    /// is set, in which case the profile nearest the target wins.
    pub fn resolve(
        &self,
        id: &str,
        inherit: bool,
        allow_override: bool,
    ) -> Result<ResolvedProfile, ValidatorError> {
        let chain = self.chain(id, inherit)?;
        let mut owners: BTreeMap<RequirementIdentity, String> = BTreeMap::new();
        let mut requirements: Vec<Arc<Requirement>> = Vec::new();
        for profile in &chain {
            for req in profile.requirements() {
                let identity = req.identity();
                if let Some(owner) = owners.get(&identity) {
                    if !allow_override {
                        return Err(ValidatorError::DuplicateRequirementCheck {
                            requirement: req.name().to_string(),
                            first: owner.clone(),
                            second: profile.identifier.clone(),
                        });
                    }
                    tracing::debug!(
                        requirement = req.name(),
                        kept = %owner,
                        dropped = %profile.identifier,
                        "requirement overridden by child profile"
                    );
                    continue;
                }
                owners.insert(identity, profile.identifier.clone());
                requirements.push(req.clone());
            }
        }
        requirements.sort_by(|a, b| a.order_cmp(b));
        Ok(ResolvedProfile { chain, requirements })
    }

    pub fn describe(&self, id: &str, inherit: bool) -> Result<ProfileDescription, ValidatorError> {
        let profile = self.get(id)?;
        let resolved = self.resolve(id, inherit, true)?;
        let mut severity_counts: BTreeMap<Severity, usize> = BTreeMap::new();
        let requirements = resolved
            .requirements
            .iter()
            .map(|r| {
                let checks = r
                    .checks()
                    .iter()
                    .map(|c| {
                        *severity_counts.entry(c.severity()).or_insert(0) += 1;
                        CheckSummary {
                            id: c.id().to_string(),
                            name: c.name().to_string(),
                            severity: c.severity(),
                            kind: c.kind_name(),
                        }
                    })
                    .collect();
                RequirementSummary {
                    profile: r.profile().to_string(),
                    name: r.name().to_string(),
                    description: r.description().to_string(),
                    severity: r.severity(),
                    source: r.source_key().to_string(),
                    checks,
                }
            })
            .collect();
        Ok(ProfileDescription {
            identifier: profile.identifier.clone(),
            name: profile.name.clone(),
            description: profile.description.clone(),
            version: profile.version.clone(),
            uri: profile.uri.clone(),
            parent: profile.parent.clone(),
            chain: resolved.chain_ids(),
            severity_counts,
            requirements,
        })
    }

    /// Pick the profile a crate declares through `conformsTo`.
    ///
    /// A profile matches when its `uri` equals one of the declared values
    /// (trailing `/` ignored). Among matches the most specific profile,
    /// i.e. the one with the longest inheritance chain, wins.
    pub fn detect_profile(&self, conforms_to: &[String]) -> Option<&Arc<Profile>> {
        let trim = |s: &str| s.trim_end_matches('/').to_string();
        let declared: BTreeSet<String> = conforms_to.iter().map(|s| trim(s.as_str())).collect();
        self.profiles
            .values()
            .filter(|p| p.uri.as_deref().is_some_and(|u| declared.contains(&trim(u))))
            .max_by_key(|p| {
                let depth = self.walk(&p.identifier).map(|c| c.len()).unwrap_or(0);
                // Reverse identifier so ties resolve to the alphabetically first.
                (depth, std::cmp::Reverse(p.identifier.clone()))
            })
    }
}
