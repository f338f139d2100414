//! Package descriptors.
//!
//! A descriptor is the *result* of evaluating a package's metadata file
//! (`bale.toml` at the package root): its name, exact version, and declared
//! sub-dependencies. Evaluating richer descriptor syntax is an external
//! collaborator's job; the core only consumes this result and treats a
//! missing or broken descriptor as a data condition.

use crate::constraint::Constraint;
use crate::name::PackageName;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name of a package descriptor at the package root.
pub const DESCRIPTOR_FILE: &str = "bale.toml";

/// Evaluated package metadata: name, version, declared sub-dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Package name as declared by the package itself.
    pub name: PackageName,
    /// Exact published version.
    pub version: Version,
    /// Declared sub-dependencies with their constraints. Ordered by name so
    /// resolution walks them deterministically.
    #[serde(default)]
    pub dependencies: BTreeMap<PackageName, Constraint>,
}

/// Errors reading a descriptor file. Callers decide whether this is fatal
/// (unpinned resolution) or recoverable (pinned git packages).
#[derive(thiserror::Error, Debug)]
pub enum DescriptorError {
    /// No descriptor file at the package root.
    #[error("no {DESCRIPTOR_FILE} found in {0}")]
    Missing(String),

    /// The descriptor file could not be read.
    #[error("failed to read descriptor: {0}")]
    Io(#[from] std::io::Error),

    /// The descriptor file exists but could not be evaluated.
    #[error("invalid descriptor: {0}")]
    Invalid(#[from] toml::de::Error),
}

impl Descriptor {
    /// A descriptor with no declared sub-dependencies.
    pub fn new(name: PackageName, version: Version) -> Self {
        Self {
            name,
            version,
            dependencies: BTreeMap::new(),
        }
    }

    /// Declare a sub-dependency.
    pub fn with_dependency(mut self, name: impl Into<PackageName>, constraint: Constraint) -> Self {
        self.dependencies.insert(name.into(), constraint);
        self
    }

    /// Read and evaluate the descriptor at a package root directory.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::Missing`] if no descriptor file exists,
    /// [`DescriptorError::Invalid`] if it cannot be evaluated.
    pub fn read_from(dir: &Path) -> Result<Self, DescriptorError> {
        let path = dir.join(DESCRIPTOR_FILE);
        if !path.exists() {
            return Err(DescriptorError::Missing(dir.display().to_string()));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Serialize this descriptor to TOML text (used by test fixtures and
    /// tooling that writes packages out).
    ///
    /// # Errors
    ///
    /// Returns an error if TOML serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
