//! Severity levels for requirements, checks, and issues.
//!
//! Severities are totally ordered: `Optional < Recommended < Required`.
//! Requirement keywords from RFC 2119 (MUST, SHOULD, MAY and their negated
//! forms) resolve onto the same three ranks. Engine result severities
//! (`Violation`, `Warning`, `Info`) are mapped separately through
//! [`Severity::from_engine`].

use crate::error::ValidatorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
/// Ordinal importance of a rule.
pub enum Severity {
    Optional = 1,
    Recommended = 2,
    #[default]
    Required = 3,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Severity; 3] = [Severity::Optional, Severity::Recommended, Severity::Required];

    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Canonical display name.
    pub fn name(self) -> &'static str {
        match self {
            Severity::Optional => "OPTIONAL",
            Severity::Recommended => "RECOMMENDED",
            Severity::Required => "REQUIRED",
        }
    }

    /// Resolve a canonical name or RFC 2119 alias (case-insensitive).
    pub fn from_name(name: &str) -> Result<Severity, ValidatorError> {
        let norm = name
            .trim()
            .to_ascii_uppercase()
            .replace(['_', '-'], " ");
        let norm = norm.split_whitespace().collect::<Vec<_>>().join(" ");
        let sev = match norm.as_str() {
            "REQUIRED" | "MUST" | "MUST NOT" | "SHALL" | "SHALL NOT" => Severity::Required,
            "RECOMMENDED" | "NOT RECOMMENDED" | "SHOULD" | "SHOULD NOT" => Severity::Recommended,
            "OPTIONAL" | "MAY" => Severity::Optional,
            _ => return Err(ValidatorError::UnknownSeverity(name.to_string())),
        };
        Ok(sev)
    }

    /// Severity implied by a tier folder name inside a profile directory.
    pub fn from_tier_folder(folder: &str) -> Option<Severity> {
        match folder.to_ascii_lowercase().as_str() {
            "must" | "required" => Some(Severity::Required),
            "should" | "recommended" => Some(Severity::Recommended),
            "may" | "optional" => Some(Severity::Optional),
            _ => None,
        }
    }

    /// Map a conformance-engine result severity onto the local scale.
    ///
    /// Accepts bare names, `sh:` prefixed names, and full SHACL IRIs.
    /// Returns `None` for anything else; callers fall back to the
    /// requirement's declared severity.
    pub fn from_engine(engine_severity: &str) -> Option<Severity> {
        let local = engine_severity
            .rsplit(['#', ':'])
            .next()
            .unwrap_or(engine_severity);
        match local {
            "Violation" => Some(Severity::Required),
            "Warning" => Some(Severity::Recommended),
            "Info" => Some(Severity::Optional),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::from_name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order_and_maximum() {
        for a in Severity::ALL {
            for b in Severity::ALL {
                for c in Severity::ALL {
                    if a < b && b < c {
                        assert!(a < c);
                    }
                }
            }
            assert!(a <= Severity::Required);
        }
        assert!(Severity::Optional < Severity::Recommended);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Required));
    }

    #[test]
    fn test_aliases_resolve_many_to_one() {
        assert_eq!(Severity::from_name("MUST").unwrap(), Severity::Required);
        assert_eq!(Severity::from_name("must not").unwrap(), Severity::Required);
        assert_eq!(Severity::from_name("Should").unwrap(), Severity::Recommended);
        assert_eq!(Severity::from_name("NOT_RECOMMENDED").unwrap(), Severity::Recommended);
        assert_eq!(Severity::from_name("may").unwrap(), Severity::Optional);
        assert_eq!("optional".parse::<Severity>().unwrap(), Severity::Optional);
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        match Severity::from_name("CRITICAL") {
            Err(ValidatorError::UnknownSeverity(n)) => assert_eq!(n, "CRITICAL"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_engine_severity_mapping() {
        assert_eq!(Severity::from_engine("sh:Violation"), Some(Severity::Required));
        assert_eq!(
            Severity::from_engine("http://www.w3.org/ns/shacl#Warning"),
            Some(Severity::Recommended)
        );
        assert_eq!(Severity::from_engine("Info"), Some(Severity::Optional));
        assert_eq!(Severity::from_engine("sh:Debug"), None);
    }

    #[test]
    fn test_tier_folders() {
        assert_eq!(Severity::from_tier_folder("must"), Some(Severity::Required));
        assert_eq!(Severity::from_tier_folder("SHOULD"), Some(Severity::Recommended));
        assert_eq!(Severity::from_tier_folder("may"), Some(Severity::Optional));
        assert_eq!(Severity::from_tier_folder("shapes"), None);
    }
}
