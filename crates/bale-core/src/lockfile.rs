//! Lock store for reproducible runs.
//!
//! The lockfile (`bale.lock`) persists a resolved [`LockedGraph`] in its
//! resolver order: name, exact version, origin, origin pin, dependency names,
//! groups, and load directive per node. An accepted stored graph is
//! authoritative: activation against it performs no adapter, network, or
//! subprocess activity. Deciding whether the stored graph still matches the
//! manifest is the caller's job.

use bale_schema::{GraphError, LockedGraph, LockedNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Failures loading or saving the lock store.
#[derive(Error, Debug)]
pub enum LockfileError {
    /// Underlying filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but is not valid lockfile TOML.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The graph could not be serialized.
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The stored node sequence violates the graph invariants.
    #[error("corrupt lockfile: {0}")]
    Graph(#[from] GraphError),

    /// The lockfile was written by an incompatible format version.
    #[error("unsupported lockfile format version {0}")]
    UnsupportedVersion(u32),
}

/// Serialized form of a locked graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    /// Lockfile format version.
    pub version: u32,
    /// Locked packages, in resolver order.
    #[serde(default)]
    pub package: Vec<LockedNode>,
}

impl Lockfile {
    /// Current lockfile format version.
    pub const FORMAT_VERSION: u32 = 1;

    /// Capture a resolved graph for persistence.
    pub fn from_graph(graph: &LockedGraph) -> Self {
        Self {
            version: Self::FORMAT_VERSION,
            package: graph.iter().cloned().collect(),
        }
    }

    /// Reconstruct the graph, re-validating the order and uniqueness
    /// invariants (the file is untrusted input).
    ///
    /// # Errors
    ///
    /// Returns [`LockfileError::UnsupportedVersion`] or
    /// [`LockfileError::Graph`].
    pub fn into_graph(self) -> Result<LockedGraph, LockfileError> {
        if self.version != Self::FORMAT_VERSION {
            return Err(LockfileError::UnsupportedVersion(self.version));
        }
        Ok(LockedGraph::try_new(self.package)?)
    }

    /// Load a locked graph from `path`. An absent file yields `Ok(None)` so
    /// that callers treat the first resolution like any other.
    ///
    /// # Errors
    ///
    /// Returns [`LockfileError`] if the file exists but cannot be read,
    /// parsed, or validated.
    pub async fn load(path: &Path) -> Result<Option<LockedGraph>, LockfileError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).await?;
        let lockfile: Lockfile = toml::from_str(&content)?;
        Ok(Some(lockfile.into_graph()?))
    }

    /// Persist a resolved graph to `path`.
    ///
    /// Called once per successful fresh resolution. The write is an atomic
    /// replace (temp file + rename), never an incremental update, so readers
    /// observe either the previous graph or the new one.
    ///
    /// # Errors
    ///
    /// Returns [`LockfileError`] on serialization or filesystem failure.
    pub async fn save(graph: &LockedGraph, path: &Path) -> Result<(), LockfileError> {
        let content = toml::to_string_pretty(&Self::from_graph(graph))?;

        let temp_path = path.with_extension("lock.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, path).await?;

        tracing::debug!("Wrote lockfile with {} packages to {}", graph.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_schema::{
        GitReference, GroupName, LoadDirective, Origin, PackageName, TriggerSpec, Version,
    };
    use tempfile::TempDir;

    fn node(name: &str, deps: &[&str]) -> LockedNode {
        LockedNode {
            name: PackageName::new(name),
            version: Version::new(1, 0, 0),
            origin: Origin::Registry,
            pin: None,
            deps: deps.iter().map(|d| PackageName::new(*d)).collect(),
            groups: vec![GroupName::default_group()],
            load: LoadDirective::Eager(Vec::new()),
            root: None,
        }
    }

    #[tokio::test]
    async fn absent_lockfile_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        let loaded = Lockfile::load(&tmp.path().join("bale.lock")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn round_trips_exactly() {
        let mut pinned = node("from-git", &[]);
        pinned.origin = Origin::Git {
            remote: "https://example.com/from-git.git".into(),
            reference: GitReference::Revision("0123456789abcdef".into()),
        };
        pinned.pin = Some("0123456789abcdef".into());
        pinned.groups = vec![GroupName::new("ci"), GroupName::default_group()];
        pinned.load = LoadDirective::Lazy(vec![
            TriggerSpec::Constant {
                name: "FromGit".into(),
            },
            TriggerSpec::InstanceMethod {
                type_name: "Widget".into(),
                method: "draw".into(),
            },
        ]);

        let mut suppressed = node("quiet", &["from-git"]);
        suppressed.load = LoadDirective::Suppressed;

        let graph =
            LockedGraph::try_new(vec![pinned, suppressed, node("top", &["quiet"])]).unwrap();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bale.lock");
        Lockfile::save(&graph, &path).await.unwrap();

        let loaded = Lockfile::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, graph);
    }

    #[tokio::test]
    async fn corrupt_order_is_rejected() {
        // Write a lockfile whose dependent precedes its dependency.
        let graph_nodes = vec![node("a", &["b"]), node("b", &[])];
        let lockfile = Lockfile {
            version: Lockfile::FORMAT_VERSION,
            package: graph_nodes,
        };
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bale.lock");
        std::fs::write(&path, toml::to_string_pretty(&lockfile).unwrap()).unwrap();

        let err = Lockfile::load(&path).await.unwrap_err();
        assert!(matches!(err, LockfileError::Graph(_)));
    }

    #[tokio::test]
    async fn unsupported_version_is_rejected() {
        let lockfile = Lockfile {
            version: 99,
            package: vec![],
        };
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bale.lock");
        std::fs::write(&path, toml::to_string_pretty(&lockfile).unwrap()).unwrap();

        let err = Lockfile::load(&path).await.unwrap_err();
        assert!(matches!(err, LockfileError::UnsupportedVersion(99)));
    }

    #[test]
    fn resolution_is_skippable_when_lockfile_accepted() {
        // The reproducibility contract in one assertion: reconstructing from
        // the serialized form needs no Dependency records and no sources.
        let graph = LockedGraph::try_new(vec![node("b", &[]), node("a", &["b"])]).unwrap();
        let lockfile = Lockfile::from_graph(&graph);
        let text = toml::to_string_pretty(&lockfile).unwrap();
        let reparsed: Lockfile = toml::from_str(&text).unwrap();
        assert_eq!(reparsed.into_graph().unwrap(), graph);
    }
}
