//! Core engine for the bale dependency manager.
//!
//! Three tightly coupled pieces live here: pluggable source adapters
//! ([`source`]) that enumerate and materialize package versions, the
//! deterministic one-pass [`resolver`] that turns dependency records into a
//! locked graph, and the [`activation`] engine that loads resolved packages
//! in resolver order, eagerly or via lazy triggers.
//!
//! Manifest syntax, CLI plumbing, and on-disk installation are external
//! collaborators; this crate starts from [`bale_schema::Dependency`] records
//! and ends at loaded packages.

pub mod activation;
pub mod lockfile;
pub mod paths;
pub mod resolver;
pub mod source;

pub use activation::{ActivationContext, ActivateError, Loader, SearchPathLoader};
pub use lockfile::{Lockfile, LockfileError};
pub use resolver::{ResolveError, Resolver, SourceSet};
pub use source::{GitCache, GitSource, Materialized, PathSource, RegistrySource, Source, SourceError};

/// User agent string for registry index fetches.
pub const USER_AGENT: &str = concat!("bale-core/", env!("CARGO_PKG_VERSION"));
