//! The locked dependency graph.
//!
//! A [`LockedGraph`] is the resolver's output: an ordered sequence of
//! [`LockedNode`]s in which every node appears after all of its dependencies.
//! This "resolver order" is the canonical load order used by the activation
//! engine, never the manifest's declaration order.

use crate::dependency::{LoadDirective, Origin};
use crate::name::{GroupName, PackageName};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One resolved package in the locked graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedNode {
    /// Package name.
    pub name: PackageName,
    /// Exact resolved version.
    pub version: Version,
    /// Origin the package resolves against.
    pub origin: Origin,
    /// Exact origin pin (git revision); `None` for registry and path origins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    /// Direct sub-dependency names as resolved.
    #[serde(default)]
    pub deps: Vec<PackageName>,
    /// Effective group tags.
    pub groups: Vec<GroupName>,
    /// Load directive for the activation engine.
    pub load: LoadDirective,
    /// Local file root when the source produced one (git checkout, path dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<std::path::PathBuf>,
}

impl LockedNode {
    /// Whether any of this node's groups appears in `requested`.
    pub fn in_groups(&self, requested: &[GroupName]) -> bool {
        self.groups.iter().any(|g| requested.contains(g))
    }
}

/// Violations of the locked graph invariants.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// Two nodes share a name.
    #[error("duplicate package in graph: {0}")]
    Duplicate(PackageName),

    /// A node appears before one of its dependencies (or depends on a node
    /// not present at all).
    #[error("package {node} depends on {dep}, which does not precede it")]
    OrderViolation {
        /// The offending dependent.
        node: PackageName,
        /// The dependency that is missing or out of order.
        dep: PackageName,
    },
}

/// Ordered, acyclic sequence of resolved nodes (dependencies first).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockedGraph {
    nodes: Vec<LockedNode>,
}

impl LockedGraph {
    /// Build a graph from nodes already in topological order, validating the
    /// ordering and uniqueness invariants. Used when reconstructing from
    /// untrusted (deserialized) input.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if a name repeats or a dependency does not
    /// precede its dependent.
    pub fn try_new(nodes: Vec<LockedNode>) -> Result<Self, GraphError> {
        let mut seen: HashSet<&PackageName> = HashSet::new();
        for node in &nodes {
            for dep in &node.deps {
                if !seen.contains(dep) {
                    return Err(GraphError::OrderViolation {
                        node: node.name.clone(),
                        dep: dep.clone(),
                    });
                }
            }
            if !seen.insert(&node.name) {
                return Err(GraphError::Duplicate(node.name.clone()));
            }
        }
        Ok(Self { nodes })
    }

    /// Build a graph from nodes the resolver emitted in post-order. The
    /// resolver upholds the invariants by construction.
    pub(crate) fn from_ordered(nodes: Vec<LockedNode>) -> Self {
        Self { nodes }
    }

    /// Look up a node by name.
    pub fn find(&self, name: &PackageName) -> Option<&LockedNode> {
        self.nodes.iter().find(|n| &n.name == name)
    }

    /// Iterate nodes in resolver order.
    pub fn iter(&self) -> std::slice::Iter<'_, LockedNode> {
        self.nodes.iter()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<'a> IntoIterator for &'a LockedGraph {
    type Item = &'a LockedNode;
    type IntoIter = std::slice::Iter<'a, LockedNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Incremental builder used by the resolver during post-order emission.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<LockedNode>,
    emitted: HashSet<PackageName>,
}

impl GraphBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a node. All of its dependencies must already be present.
    pub fn push(&mut self, node: LockedNode) {
        debug_assert!(
            node.deps.iter().all(|d| self.emitted.contains(d)),
            "node emitted before its dependencies"
        );
        self.emitted.insert(node.name.clone());
        self.nodes.push(node);
    }

    /// Finish, producing the locked graph.
    pub fn build(self) -> LockedGraph {
        LockedGraph::from_ordered(self.nodes)
    }
}
