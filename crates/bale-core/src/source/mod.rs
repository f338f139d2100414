//! Source adapters.
//!
//! Every place a package can come from implements [`Source`]: enumerate the
//! candidate versions for a name, and materialize one candidate into its
//! declared sub-dependencies plus (where the source produces one) a local
//! file root. The resolver talks to sources only through this trait.

use async_trait::async_trait;
use bale_schema::{Descriptor, PackageName, Version};
use std::path::PathBuf;
use thiserror::Error;

mod git;
mod path;
mod registry;

pub use git::{GitCache, GitSource};
pub use path::PathSource;
pub use registry::{RegistryIndex, RegistrySource};

/// Result of materializing one package version from a source.
#[derive(Debug, Clone)]
pub struct Materialized {
    /// The package's evaluated descriptor (possibly a synthesized
    /// placeholder; see [`GitSource`]).
    pub descriptor: Descriptor,
    /// Local file root containing the package's files, when the source
    /// produces one. Registry packages are installed by an external
    /// collaborator and yield `None`.
    pub root: Option<PathBuf>,
    /// Exact origin pin (git revision) backing this materialization.
    pub pin: Option<String>,
}

/// Failures surfaced by source adapters.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The adapter itself cannot be reached (index unreadable, HTTP failure).
    #[error("source '{locator}' unavailable: {detail}")]
    Unavailable {
        /// Human-readable source identity.
        locator: String,
        /// What went wrong.
        detail: String,
    },

    /// The requested name/version is absent from this source.
    #[error("source contains no match for '{name}': {detail}")]
    SpecNotFound {
        /// Requested package.
        name: PackageName,
        /// What the source does contain, when known.
        detail: String,
    },

    /// The package exists but its descriptor could not be evaluated.
    #[error("invalid metadata for '{name}': {detail}")]
    MetadataInvalid {
        /// Offending package.
        name: PackageName,
        /// Underlying descriptor failure.
        detail: String,
    },

    /// A git transport-level failure (unreachable host, rejected key).
    /// Carries the remote locator and the transport's diagnostic verbatim.
    #[error("An error has occurred in git. Cannot complete bundling.\nremote: {remote}\n{diagnostic}")]
    Transport {
        /// Remote locator the failure occurred against.
        remote: String,
        /// Raw stderr from the git subprocess.
        diagnostic: String,
    },

    /// A missing or invalid git ref, revision, or repository.
    #[error("git ref not found for remote {remote}\n{diagnostic}")]
    RefNotFound {
        /// Remote locator the failure occurred against.
        remote: String,
        /// Raw stderr from the git subprocess.
        diagnostic: String,
    },

    /// Local I/O failure while operating on a source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A place packages can be listed from and materialized out of.
#[async_trait]
pub trait Source: Send + Sync {
    /// Enumerate the available versions for `name`, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the adapter cannot be reached,
    /// [`SourceError::SpecNotFound`] if it knows nothing about `name`.
    async fn list_versions(&self, name: &PackageName) -> Result<Vec<Version>, SourceError>;

    /// Materialize `name` at `version`: evaluate its descriptor and, for
    /// sources with a local presence, produce the package's file root.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::SpecNotFound`] if the exact name/version is
    /// absent, [`SourceError::MetadataInvalid`] if the descriptor cannot be
    /// evaluated and the source cannot recover.
    async fn materialize(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Materialized, SourceError>;

    /// Human-readable identity used in error messages and logs.
    fn describe(&self) -> String;
}
