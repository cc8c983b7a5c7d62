//! Configuration discovery and effective settings resolution.
//!
//! The validator reads `rocrate-validator.toml|yaml|yml` from the working
//! directory (or closest ancestor) and merges it with CLI flags to produce
//! an `Effective` config. Defaults:
//! - `profiles_path`: none (the profiles embedded in the binary)
//! - `profile`: none (detected from the crate's `conformsTo`)
//! - `inherit`, `override`: true
//! - `severity`: `REQUIRED`
//! - `fail_fast`: false
//! - `output`: `human`
//! - `timeout_secs`: none
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::error::ValidatorError;
use crate::models::Severity;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILES: [&str; 3] = [
    "rocrate-validator.toml",
    "rocrate-validator.yaml",
    "rocrate-validator.yml",
];

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// Root configuration loaded from `rocrate-validator.toml|yaml`.
pub struct ValidatorConfig {
    /// Profile root; relative paths are taken from the config directory.
    pub profiles_path: Option<String>,
    pub profile: Option<String>,
    pub inherit: Option<bool>,
    #[serde(rename = "override")]
    pub allow_override: Option<bool>,
    pub severity: Option<String>,
    pub fail_fast: Option<bool>,
    #[serde(default)]
    pub skip_checks: Vec<String>,
    pub output: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone)]
/// Values given on the command line; `None` defers to the config file.
pub struct CliOverrides {
    pub root: Option<String>,
    pub profiles_path: Option<String>,
    pub profile: Option<String>,
    pub inherit: Option<bool>,
    pub allow_override: Option<bool>,
    pub severity: Option<String>,
    pub fail_fast: Option<bool>,
    pub skip_checks: Vec<String>,
    pub output: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub config_root: PathBuf,
    /// Profile root on disk; `None` selects the bundled profiles.
    pub profiles_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub inherit: bool,
    pub allow_override: bool,
    pub severity: Severity,
    pub fail_fast: bool,
    pub skip_checks: BTreeSet<String>,
    pub output: String,
    pub timeout: Option<Duration>,
}

/// Walk upward from `start` to the directory holding the configuration.
///
/// `start` is made absolute first so relative starts such as `.` reach their
/// real ancestors. Stops when a `rocrate-validator.toml|yaml|yml` or a
/// `.git` directory is found; otherwise returns the absolute `start`.
pub fn detect_config_root(start: &Path) -> PathBuf {
    let start = fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    let mut cur = start.as_path();
    loop {
        if CONFIG_FILES.iter().any(|f| cur.join(f).exists()) {
            return cur.to_path_buf();
        }
        if cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.clone(),
        }
    }
}

/// Load `ValidatorConfig` from `rocrate-validator.toml` or `.yaml|.yml`.
///
/// A file that fails to parse is reported and ignored.
pub fn load_config(root: &Path) -> Option<ValidatorConfig> {
    for name in CONFIG_FILES {
        let p = root.join(name);
        if !p.exists() {
            continue;
        }
        let s = match fs::read_to_string(&p) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(file = %p.display(), error = %e, "cannot read config file");
                return None;
            }
        };
        let parsed = if name.ends_with(".toml") {
            toml::from_str::<ValidatorConfig>(&s).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str::<ValidatorConfig>(&s).map_err(|e| e.to_string())
        };
        return match parsed {
            Ok(cfg) => {
                tracing::debug!(file = %p.display(), "loaded config");
                Some(cfg)
            }
            Err(e) => {
                tracing::warn!(file = %p.display(), error = %e, "ignoring malformed config file");
                None
            }
        };
    }
    None
}

/// Resolve `Effective` by merging CLI flags, discovered config, and defaults.
///
/// Fails only on an unknown severity name.
pub fn resolve_effective(cli: CliOverrides) -> Result<Effective, ValidatorError> {
    let start = PathBuf::from(cli.root.as_deref().unwrap_or("."));
    let config_root = detect_config_root(&start);
    let cfg = load_config(&config_root).unwrap_or_default();

    let profiles_path = match cli.profiles_path {
        Some(p) => Some(PathBuf::from(p)),
        None => cfg.profiles_path.map(|p| {
            let p = PathBuf::from(p);
            if p.is_relative() {
                config_root.join(p)
            } else {
                p
            }
        }),
    };

    let severity = match cli.severity.or(cfg.severity) {
        Some(s) => Severity::from_name(&s)?,
        None => Severity::Required,
    };

    let skip_checks = if cli.skip_checks.is_empty() {
        cfg.skip_checks
    } else {
        cli.skip_checks
    };

    let output = cli
        .output
        .or(cfg.output)
        .unwrap_or_else(|| "human".to_string());

    Ok(Effective {
        config_root,
        profiles_path,
        profile: cli.profile.or(cfg.profile),
        inherit: cli.inherit.or(cfg.inherit).unwrap_or(true),
        allow_override: cli.allow_override.or(cfg.allow_override).unwrap_or(true),
        severity,
        fail_fast: cli.fail_fast.or(cfg.fail_fast).unwrap_or(false),
        skip_checks: skip_checks.into_iter().collect(),
        output,
        timeout: cli
            .timeout_secs
            .or(cfg.timeout_secs)
            .map(Duration::from_secs),
    })
}
