//! Version constraints.
//!
//! Thin wrapper over [`semver::VersionReq`] that adds the one piece of
//! information the resolver and git source care about beyond matching:
//! whether the requirement pins a single exact version.

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A version requirement attached to a dependency record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Constraint(VersionReq);

impl Constraint {
    /// The unconstrained requirement (`*`), matching any version.
    pub fn any() -> Self {
        Self(VersionReq::STAR)
    }

    /// A requirement pinning exactly `version`.
    pub fn exact(version: &Version) -> Self {
        Self(VersionReq::parse(&format!("={version}")).unwrap_or(VersionReq::STAR))
    }

    /// Whether `version` satisfies this constraint.
    pub fn matches(&self, version: &Version) -> bool {
        self.0.matches(version)
    }

    /// If this constraint admits exactly one version (`=x.y.z`), return it.
    ///
    /// The resolver uses this to decide whether a broken descriptor can be
    /// recovered with a placeholder node, and the git source uses it to skip
    /// version listing entirely.
    pub fn exact_version(&self) -> Option<Version> {
        if self.0.comparators.len() != 1 {
            return None;
        }
        let c = &self.0.comparators[0];
        if c.op != semver::Op::Exact {
            return None;
        }
        let mut version = Version::new(c.major, c.minor?, c.patch?);
        version.pre = c.pre.clone();
        Some(version)
    }
}

impl FromStr for Constraint {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "latest" || s.is_empty() {
            return Ok(Self::any());
        }
        Ok(Self(VersionReq::parse(s)?))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Self::any()
    }
}
