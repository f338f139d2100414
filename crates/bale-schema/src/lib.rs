//! Shared data model for the bale dependency manager.
//!
//! This crate holds the leaf types consumed by every other layer: dependency
//! records as handed over by the manifest front-end, version constraints,
//! package descriptors, and the locked dependency graph produced by the
//! resolver. It performs no I/O beyond reading descriptor files and has no
//! knowledge of sources or activation.

pub mod constraint;
pub mod dependency;
pub mod descriptor;
pub mod graph;
pub mod name;

// Re-exports
pub use constraint::Constraint;
pub use dependency::{
    default_entry, infer_namespace, Dependency, GitReference, LoadDirective, Origin, TriggerSpec,
};
pub use descriptor::{Descriptor, DescriptorError, DESCRIPTOR_FILE};
pub use graph::{GraphBuilder, GraphError, LockedGraph, LockedNode};
pub use name::{GroupName, NameError, PackageName};

/// Re-export of the version type used throughout the workspace.
pub use semver::Version;
