//! Validated name newtypes.
//!
//! `PackageName` and `GroupName` eliminate the ambiguity of raw strings in
//! APIs and guarantee the handful of invariants the rest of the system leans
//! on (non-empty, no whitespace).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Errors that can occur when validating a name.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NameError {
    /// The name was empty.
    #[error("name must not be empty")]
    Empty,

    /// The name contained whitespace.
    #[error("name must not contain whitespace: {0:?}")]
    Whitespace(String),
}

/// A package name, unique within one manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new `PackageName` without validation.
    ///
    /// Used for names coming from trusted internal structures (index entries,
    /// lockfiles). External input should go through [`PackageName::parse`].
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Create a validated `PackageName`.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] if the name is empty or contains whitespace.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(NameError::Whitespace(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// View the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A symbolic group tag attached to a dependency record.
///
/// Records that declare no groups implicitly belong to the `default` group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    /// Create a new `GroupName`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The implicit `default` group.
    pub fn default_group() -> Self {
        Self("default".to_string())
    }

    /// View the group as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GroupName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
