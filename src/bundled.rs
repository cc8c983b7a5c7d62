//! Profiles compiled into the binary.
//!
//! The files under `profiles/` are embedded with `include_str!` and loaded
//! when no profile root is configured, so an installed binary does not need
//! the source tree.

use crate::checks::PredicateRegistry;
use crate::error::ValidatorError;
use crate::profile::{assemble_profile, Profile, RuleSource, MANIFEST_FILE};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Location reported for bundled profile files.
pub const BUNDLED_ROOT: &str = "<bundled>";

/// Bundled profile files, keyed by their path below the profile root.
pub const BUNDLED_FILES: &[(&str, &str)] = &[
    (
        "ro-crate/profile.toml",
        include_str!("../profiles/ro-crate/profile.toml"),
    ),
    (
        "ro-crate/must/0_file_descriptor_existence.toml",
        include_str!("../profiles/ro-crate/must/0_file_descriptor_existence.toml"),
    ),
    (
        "ro-crate/must/1_file_descriptor_format.toml",
        include_str!("../profiles/ro-crate/must/1_file_descriptor_format.toml"),
    ),
    (
        "ro-crate/must/2_metadata_entities.toml",
        include_str!("../profiles/ro-crate/must/2_metadata_entities.toml"),
    ),
    (
        "ro-crate/must/3_data_entities.toml",
        include_str!("../profiles/ro-crate/must/3_data_entities.toml"),
    ),
    (
        "ro-crate/should/root_data_entity.toml",
        include_str!("../profiles/ro-crate/should/root_data_entity.toml"),
    ),
    (
        "ro-crate/may/contextual_entities.yaml",
        include_str!("../profiles/ro-crate/may/contextual_entities.yaml"),
    ),
    (
        "workflow-ro-crate/profile.toml",
        include_str!("../profiles/workflow-ro-crate/profile.toml"),
    ),
    (
        "workflow-ro-crate/must/0_main_workflow.toml",
        include_str!("../profiles/workflow-ro-crate/must/0_main_workflow.toml"),
    ),
    (
        "workflow-ro-crate/should/workflow_metadata.toml",
        include_str!("../profiles/workflow-ro-crate/should/workflow_metadata.toml"),
    ),
];

type ProfileFiles = (Option<&'static str>, Vec<RuleSource>);

/// Load the bundled profiles, sorted by identifier.
pub fn load_bundled(predicates: &PredicateRegistry) -> Result<Vec<Profile>, ValidatorError> {
    let mut dirs: BTreeMap<&str, ProfileFiles> = BTreeMap::new();
    for &(path, text) in BUNDLED_FILES {
        let Some((dir, rel)) = path.split_once('/') else {
            continue;
        };
        let entry = dirs.entry(dir).or_default();
        if rel == MANIFEST_FILE {
            entry.0 = Some(text);
        } else {
            entry.1.push(RuleSource {
                path: Path::new(BUNDLED_ROOT).join(path),
                rel: PathBuf::from(rel),
                text: text.to_string(),
            });
        }
    }

    let mut profiles = Vec::with_capacity(dirs.len());
    for (dir, (manifest, mut sources)) in dirs {
        sources.sort_by(|a, b| a.rel.cmp(&b.rel));
        let location = Path::new(BUNDLED_ROOT).join(dir);
        profiles.push(assemble_profile(
            &location,
            dir.to_string(),
            manifest,
            sources,
            predicates,
        )?);
    }
    profiles.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    tracing::debug!(count = profiles.len(), "loaded bundled profiles");
    Ok(profiles)
}
