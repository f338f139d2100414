//! Dependency resolution.
//!
//! The resolver turns a manifest's dependency records into a [`LockedGraph`]
//! in a single deterministic pass: no backtracking search, each name resolved
//! exactly once. Explicit-origin adapters take precedence over registries;
//! registries are consulted first-configured-first-checked. Constraints from
//! multiple requesters of one name are merged, and any name that admits no
//! single satisfying version fails with the full requester chain.
//!
//! The graph's order is produced by a stable post-order traversal from the
//! top-level records in manifest declaration order, so every node is emitted
//! after its dependencies regardless of where the manifest declared it.

use crate::source::{GitCache, GitSource, PathSource, Source, SourceError};
use bale_schema::{
    Constraint, Dependency, GraphBuilder, GroupName, LoadDirective, LockedGraph, LockedNode,
    Origin, PackageName, Version,
};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// How many adapters are queried concurrently during the prefetch pass.
const PREFETCH_CONCURRENCY: usize = 8;

/// Failures surfaced by resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// An adapter failed in a way resolution cannot recover from.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Multiple requesters constrain one name with no version satisfying all
    /// of them.
    #[error("version conflict on '{name}': {}", format_requesters(.requirements))]
    VersionConflict {
        /// The contested package.
        name: PackageName,
        /// Every `(requester, constraint)` pair recorded for the name.
        requirements: Vec<(PackageName, Constraint)>,
    },

    /// No source offered a version satisfying the (merged) constraint.
    #[error(
        "no version of '{name}' (required by {requester}) satisfies {constraint}; available: [{}]",
        .available.join(", ")
    )]
    NoMatchingVersion {
        /// The unsatisfiable package.
        name: PackageName,
        /// Who asked for it.
        requester: PackageName,
        /// The merged constraint display.
        constraint: String,
        /// Versions the consulted sources do offer.
        available: Vec<String>,
    },

    /// The descriptor graph contains a cycle.
    #[error("dependency cycle detected involving '{0}'")]
    Cycle(PackageName),
}

fn format_requesters(requirements: &[(PackageName, Constraint)]) -> String {
    requirements
        .iter()
        .map(|(req, c)| format!("{req} requires {c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The configured set of sources for one resolution run.
///
/// Registries are shared and ordered; git and path adapters are constructed
/// on demand per origin and cached for the duration of the run, so a remote
/// shared by several records is fetched at most once.
pub struct SourceSet {
    registries: Vec<Arc<dyn Source>>,
    git_cache: Arc<GitCache>,
    adapters: std::sync::Mutex<HashMap<String, Arc<dyn Source>>>,
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSet")
            .field("registries", &self.registries.len())
            .finish_non_exhaustive()
    }
}

impl SourceSet {
    /// Create a source set backed by the given git cache.
    pub fn new(git_cache: Arc<GitCache>) -> Self {
        Self {
            registries: Vec::new(),
            git_cache,
            adapters: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Append a registry. Registries are checked in configuration order.
    pub fn with_registry(mut self, registry: Arc<dyn Source>) -> Self {
        self.registries.push(registry);
        self
    }

    fn registries(&self) -> &[Arc<dyn Source>] {
        &self.registries
    }

    /// Adapter for an explicit origin, constructed once per run.
    fn adapter_for(&self, origin: &Origin) -> Result<Option<Arc<dyn Source>>, ResolveError> {
        let key = match origin {
            Origin::Registry => return Ok(None),
            Origin::Git { remote, reference } => format!("git:{remote}:{reference:?}"),
            Origin::Path { root } => format!("path:{}", root.display()),
        };

        let mut adapters = self.adapters.lock().expect("adapter cache poisoned");
        if let Some(existing) = adapters.get(&key) {
            return Ok(Some(existing.clone()));
        }

        let adapter: Arc<dyn Source> = match origin {
            Origin::Registry => unreachable!(),
            Origin::Git { remote, reference } => Arc::new(GitSource::new(
                remote.clone(),
                reference.clone(),
                self.git_cache.clone(),
            )),
            Origin::Path { root } => Arc::new(PathSource::scan(root.clone())?),
        };
        adapters.insert(key, adapter.clone());
        Ok(Some(adapter))
    }
}

/// State of one resolved name during the walk.
struct ResolvedEntry {
    version: Version,
    origin: Origin,
    pin: Option<String>,
    root: Option<PathBuf>,
    deps: Vec<PackageName>,
    groups: BTreeSet<GroupName>,
    load: LoadDirective,
}

/// One-pass dependency resolver.
#[derive(Debug)]
pub struct Resolver<'a> {
    sources: &'a SourceSet,
}

/// Mutable walk state, shared across the recursion.
struct Walk<'r> {
    top_level: HashMap<&'r PackageName, &'r Dependency>,
    resolved: HashMap<PackageName, ResolvedEntry>,
    requirements: HashMap<PackageName, Vec<(PackageName, Constraint)>>,
    visiting: HashSet<PackageName>,
    order: Vec<PackageName>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over the configured sources.
    pub fn new(sources: &'a SourceSet) -> Self {
        Self { sources }
    }

    /// Resolve the full set of dependency records into a locked graph.
    ///
    /// Version listing for top-level records runs concurrently (bounded) and
    /// is joined before any constraint merging begins; the merge itself is
    /// sequential and deterministic.
    ///
    /// # Errors
    ///
    /// See [`ResolveError`]. Any error aborts the whole run: no partial
    /// graph is produced.
    pub async fn resolve(&self, records: &[Dependency]) -> Result<LockedGraph, ResolveError> {
        tracing::debug!("Resolving {} dependency records", records.len());
        self.prefetch(records).await;

        let mut walk = Walk {
            top_level: records.iter().map(|d| (&d.name, d)).collect(),
            resolved: HashMap::new(),
            requirements: HashMap::new(),
            visiting: HashSet::new(),
            order: Vec::new(),
        };

        let manifest = PackageName::new("manifest");
        for record in records {
            self.resolve_name(
                &mut walk,
                record.name.clone(),
                record.constraint.clone(),
                manifest.clone(),
                Origin::Registry,
                record.groups.iter().cloned().collect(),
            )
            .await?;
        }

        let mut builder = GraphBuilder::new();
        for name in &walk.order {
            let entry = &walk.resolved[name];
            builder.push(LockedNode {
                name: name.clone(),
                version: entry.version.clone(),
                origin: entry.origin.clone(),
                pin: entry.pin.clone(),
                deps: entry.deps.clone(),
                groups: entry.groups.iter().cloned().collect(),
                load: entry.load.clone(),
                root: entry.root.clone(),
            });
        }
        let graph = builder.build();
        tracing::debug!("Resolved {} packages", graph.len());
        Ok(graph)
    }

    /// Warm every top-level adapter concurrently. Failures are ignored here;
    /// the sequential pass reports them in manifest declaration order.
    async fn prefetch(&self, records: &[Dependency]) {
        let tasks = records.iter().filter_map(|record| {
            let adapter = self.sources.adapter_for(&record.origin).ok().flatten()?;
            let name = record.name.clone();
            Some(async move {
                let _ = adapter.list_versions(&name).await;
            })
        });

        stream::iter(tasks)
            .buffer_unordered(PREFETCH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
    }

    /// Resolve one name, recursing into its declared sub-dependencies.
    ///
    /// `requester_origin` gives transitive names source affinity: a name with
    /// no top-level record is looked up in its requester's origin before the
    /// registries are consulted.
    ///
    /// Names already resolved are only verified for constraint compatibility
    /// and have the requester's groups propagated into the record-less part
    /// of their subtree. A node is emitted only once its whole subtree has
    /// been, so a back-edge to a name still being walked surfaces as
    /// [`ResolveError::Cycle`].
    fn resolve_name<'w, 'r>(
        &'w self,
        walk: &'w mut Walk<'r>,
        name: PackageName,
        constraint: Constraint,
        requester: PackageName,
        requester_origin: Origin,
        groups: BTreeSet<GroupName>,
    ) -> BoxFuture<'w, Result<(), ResolveError>>
    where
        'r: 'w,
    {
        async move {
            walk.requirements
                .entry(name.clone())
                .or_default()
                .push((requester.clone(), constraint.clone()));

            if walk.resolved.contains_key(&name) {
                let version = walk.resolved[&name].version.clone();
                if !constraint.matches(&version) {
                    return Err(ResolveError::VersionConflict {
                        name: name.clone(),
                        requirements: walk.requirements[&name].clone(),
                    });
                }
                propagate_groups(walk, &name, &groups);
                return Ok(());
            }

            if walk.visiting.contains(&name) {
                return Err(ResolveError::Cycle(name));
            }
            walk.visiting.insert(name.clone());

            // A top-level record for this name carries authority over origin,
            // groups, and load directive even when the name is first reached
            // transitively. Without one, the requester's origin is inherited
            // with the registries as fallback, and the node is set up but
            // never auto-loaded: only manifest records request loading.
            let record = walk.top_level.get(&name).copied();
            let (candidate_origin, explicit) = match record {
                Some(r) => (r.origin.clone(), true),
                None => (requester_origin, false),
            };
            let load = record.map_or(LoadDirective::Suppressed, |r| r.load.clone());
            let effective_groups: BTreeSet<GroupName> = match record {
                Some(r) => r.groups.iter().cloned().collect(),
                None => groups,
            };

            let merged: Vec<Constraint> = walk.requirements[&name]
                .iter()
                .map(|(_, c)| c.clone())
                .collect();

            let (picked, adapter, origin) = self
                .pick_version(walk, &name, &candidate_origin, explicit, &merged, &requester)
                .await?;
            tracing::debug!("Resolving {} @ {} via {}", name, picked, adapter.describe());

            let materialized = adapter.materialize(&name, &picked).await?;
            let deps: Vec<(PackageName, Constraint)> = materialized
                .descriptor
                .dependencies
                .iter()
                .map(|(n, c)| (n.clone(), c.clone()))
                .collect();

            // Recursion happens while the name is still marked visiting, so
            // the node lands in `resolved` and the emission order only after
            // its entire subtree did.
            for (dep_name, dep_constraint) in &deps {
                self.resolve_name(
                    walk,
                    dep_name.clone(),
                    dep_constraint.clone(),
                    name.clone(),
                    origin.clone(),
                    effective_groups.clone(),
                )
                .await?;
            }

            walk.visiting.remove(&name);
            walk.resolved.insert(
                name.clone(),
                ResolvedEntry {
                    version: picked,
                    origin,
                    pin: materialized.pin,
                    root: materialized.root,
                    deps: deps.into_iter().map(|(n, _)| n).collect(),
                    groups: effective_groups,
                    load,
                },
            );
            walk.order.push(name);
            Ok(())
        }
        .boxed()
    }

    /// Pick the adapter, version, and effective origin for a name per the
    /// fixed precedence. An `explicit` origin wins outright; an inherited one
    /// falls back to the registries when it does not carry the name.
    async fn pick_version(
        &self,
        walk: &Walk<'_>,
        name: &PackageName,
        origin: &Origin,
        explicit: bool,
        merged: &[Constraint],
        requester: &PackageName,
    ) -> Result<(Version, Arc<dyn Source>, Origin), ResolveError> {
        if let Some(adapter) = self.sources.adapter_for(origin)? {
            // An exact pin on an explicit git origin skips listing entirely,
            // which is what keeps packages without descriptors resolvable.
            if explicit && matches!(origin, Origin::Git { .. }) {
                if let Some(exact) = exact_of(merged) {
                    return Ok((exact, adapter, origin.clone()));
                }
            }
            match adapter.list_versions(name).await {
                Ok(versions) => {
                    let picked = best_match(&versions, merged)
                        .ok_or_else(|| unsatisfiable(walk, name, requester, merged, &versions))?;
                    return Ok((picked, adapter, origin.clone()));
                }
                // An inherited origin that does not carry the name is not an
                // error; the registries get their turn.
                Err(SourceError::SpecNotFound { .. }) if !explicit => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Registries, first-configured-first-checked.
        let mut last_not_found: Option<SourceError> = None;
        for registry in self.sources.registries() {
            match registry.list_versions(name).await {
                Ok(versions) => {
                    if let Some(picked) = best_match(&versions, merged) {
                        return Ok((picked, registry.clone(), Origin::Registry));
                    }
                    return Err(unsatisfiable(walk, name, requester, merged, &versions));
                }
                Err(e @ SourceError::SpecNotFound { .. }) => last_not_found = Some(e),
                // Unreachable adapters abort the whole run.
                Err(e) => return Err(e.into()),
            }
        }

        match last_not_found {
            Some(e) => Err(e.into()),
            None => Err(SourceError::SpecNotFound {
                name: name.clone(),
                detail: "no registries configured".to_string(),
            }
            .into()),
        }
    }
}

/// Build the error for a name no candidate version satisfies: a conflict when
/// several requesters disagree, otherwise a plain no-match.
fn unsatisfiable(
    walk: &Walk<'_>,
    name: &PackageName,
    requester: &PackageName,
    merged: &[Constraint],
    available: &[Version],
) -> ResolveError {
    let requirements = walk.requirements.get(name).cloned().unwrap_or_default();
    if requirements.len() > 1 {
        return ResolveError::VersionConflict {
            name: name.clone(),
            requirements,
        };
    }
    ResolveError::NoMatchingVersion {
        name: name.clone(),
        requester: requester.clone(),
        constraint: merged
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        available: available.iter().map(ToString::to_string).collect(),
    }
}

/// The highest version satisfying every merged constraint.
fn best_match(versions: &[Version], merged: &[Constraint]) -> Option<Version> {
    versions
        .iter()
        .filter(|v| merged.iter().all(|c| c.matches(v)))
        .max()
        .cloned()
}

/// If any merged constraint is an exact pin, return it (and only if every
/// other constraint admits it).
fn exact_of(merged: &[Constraint]) -> Option<Version> {
    let exact = merged.iter().find_map(Constraint::exact_version)?;
    merged.iter().all(|c| c.matches(&exact)).then_some(exact)
}

/// Union `groups` into an already-resolved subtree. Declared records keep
/// their own groups; inheritance only reaches names that exist purely as
/// transitive dependencies.
fn propagate_groups(walk: &mut Walk<'_>, name: &PackageName, groups: &BTreeSet<GroupName>) {
    let mut pending = vec![name.clone()];
    while let Some(current) = pending.pop() {
        if walk.top_level.contains_key(&current) {
            continue;
        }
        if let Some(entry) = walk.resolved.get_mut(&current) {
            let before = entry.groups.len();
            entry.groups.extend(groups.iter().cloned());
            if entry.groups.len() != before {
                pending.extend(entry.deps.iter().cloned());
            }
        }
    }
}
