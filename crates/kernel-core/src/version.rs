//! Semantic-version gating for declared dependencies.
//!
//! Wraps `semver::VersionReq` the way a dependency range is typically
//! expressed in a manifest: a constraint string such as `^1.0.0` or
//! `~2.3`, parsed once and checked many times during resolution.

use semver::{Version, VersionReq};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, semver::Error),
    #[error("invalid version range '{0}': {1}")]
    InvalidRange(String, semver::Error),
}

/// A parsed semver constraint, e.g. `^1.2.0`, `~1.2`, `>=1.0.0, <2.0.0`.
#[derive(Debug, Clone)]
pub struct VersionRange {
    constraint: String,
    req: VersionReq,
}

impl VersionRange {
    pub fn parse(constraint: &str) -> Result<Self, VersionError> {
        let req = VersionReq::parse(constraint)
            .map_err(|e| VersionError::InvalidRange(constraint.to_string(), e))?;
        Ok(VersionRange {
            constraint: constraint.to_string(),
            req,
        })
    }

    /// Any version satisfies this range.
    pub fn any() -> Self {
        VersionRange::parse("*").expect("'*' is always a valid semver range")
    }

    pub fn includes(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    pub fn constraint_str(&self) -> &str {
        &self.constraint
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.constraint)
    }
}

pub fn parse_version(version: &str) -> Result<Version, VersionError> {
    Version::parse(version).map_err(|e| VersionError::InvalidVersion(version.to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_range_matches_minor_and_patch_bumps() {
        let range = VersionRange::parse("^1.0.0").unwrap();
        assert!(range.includes(&parse_version("1.2.3").unwrap()));
        assert!(!range.includes(&parse_version("2.0.0").unwrap()));
    }

    #[test]
    fn tilde_range_matches_patch_bumps_only() {
        let range = VersionRange::parse("~1.2.0").unwrap();
        assert!(range.includes(&parse_version("1.2.9").unwrap()));
        assert!(!range.includes(&parse_version("1.3.0").unwrap()));
    }

    #[test]
    fn comparator_set_is_honoured() {
        let range = VersionRange::parse(">=1.0.0, <2.0.0").unwrap();
        assert!(range.includes(&parse_version("1.9.9").unwrap()));
        assert!(!range.includes(&parse_version("2.0.0").unwrap()));
    }
}
