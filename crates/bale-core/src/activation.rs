//! Activation engine.
//!
//! Consumes a [`LockedGraph`] and a set of requested groups, and loads the
//! matching packages strictly in graph (resolver) order, never in manifest
//! declaration order. Eager nodes load immediately; lazy nodes install
//! triggers that defer the load until a watched symbol is first used.
//!
//! The host language's symbol-loading primitive is abstracted behind
//! [`Loader`]; the trigger table lives in an explicitly owned
//! [`ActivationContext`] rather than ambient global state, so independent
//! activations (tests included) cannot cross-contaminate.
//!
//! Activation is strictly single-threaded: lazy triggers mutate one shared
//! symbol namespace, and "first trigger wins" is only well-defined with
//! ordered firing.

use bale_schema::{
    default_entry, GroupName, LoadDirective, LockedGraph, PackageName, TriggerSpec,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced to the activation caller.
///
/// These are loading-layer failures, distinct from resolution failures: "no
/// such file to load" means the package resolved fine but its entry file is
/// absent.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ActivateError {
    /// An eager load path does not exist. Halts processing of the remaining
    /// requested groups; already-loaded nodes stay loaded.
    #[error("no such file to load -- {0}")]
    MissingLoadPath(String),
}

/// The host's symbol-loading primitive.
///
/// The engine performs every actual load through this trait; implementations
/// decide what "loading a feature" means (evaluating a file, linking a
/// module, recording the call in tests).
pub trait Loader {
    /// Load `feature`. Loading the same feature twice must be a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ActivateError::MissingLoadPath`] if the feature cannot be
    /// found.
    fn load(&mut self, feature: &str) -> Result<(), ActivateError>;
}

/// A [`Loader`] resolving features against the file roots of locked nodes.
///
/// A feature `f` is found if `<root>/<f>` (optionally with a configured
/// extension) exists under any search root. Load order is recorded; repeat
/// loads of one feature are ignored.
#[derive(Debug, Default)]
pub struct SearchPathLoader {
    roots: Vec<PathBuf>,
    extension: Option<String>,
    loaded: Vec<String>,
}

impl SearchPathLoader {
    /// Create a loader over the given search roots.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            extension: None,
            loaded: Vec::new(),
        }
    }

    /// Build a loader from the file roots present in a locked graph.
    pub fn from_graph(graph: &LockedGraph) -> Self {
        Self::new(graph.iter().filter_map(|n| n.root.clone()))
    }

    /// Also try `<feature>.<ext>` when probing for files.
    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }

    /// Features loaded so far, in load order.
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    fn locate(&self, feature: &str) -> bool {
        self.roots.iter().any(|root| {
            if root.join(feature).is_file() {
                return true;
            }
            self.extension
                .as_ref()
                .is_some_and(|ext| root.join(format!("{feature}.{ext}")).is_file())
        })
    }
}

impl Loader for SearchPathLoader {
    fn load(&mut self, feature: &str) -> Result<(), ActivateError> {
        if self.loaded.iter().any(|f| f == feature) {
            return Ok(());
        }
        if !self.locate(feature) {
            return Err(ActivateError::MissingLoadPath(feature.to_string()));
        }
        self.loaded.push(feature.to_string());
        Ok(())
    }
}

/// Identity of a watched symbol or behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TriggerKey {
    Constant(String),
    TypeMethod(String, String),
    InstanceMethod(String, String),
}

impl TriggerKey {
    fn from_spec(spec: &TriggerSpec) -> Self {
        match spec {
            TriggerSpec::Constant { name } => Self::Constant(name.clone()),
            TriggerSpec::TypeMethod { type_name, method } => {
                Self::TypeMethod(type_name.clone(), method.clone())
            }
            TriggerSpec::InstanceMethod { type_name, method } => {
                Self::InstanceMethod(type_name.clone(), method.clone())
            }
        }
    }
}

/// A deferred load shared by all of one node's triggers.
#[derive(Debug)]
struct PendingLoad {
    feature: String,
    keys: Vec<TriggerKey>,
    // constants the load defines, marked present once fired
    constants: Vec<String>,
}

/// Explicitly owned activation state: which packages have been activated,
/// which triggers are pending, which symbols are defined.
#[derive(Debug)]
pub struct ActivationContext<L: Loader> {
    loader: L,
    activated: HashSet<PackageName>,
    watches: HashMap<TriggerKey, usize>,
    pending: Vec<Option<PendingLoad>>,
    defined: HashSet<String>,
}

impl<L: Loader> ActivationContext<L> {
    /// Create a context around a loader.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            activated: HashSet::new(),
            watches: HashMap::new(),
            pending: Vec::new(),
            defined: HashSet::new(),
        }
    }

    /// Access the loader (typically to inspect what got loaded).
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Activate every node of `graph` whose groups intersect `groups`, in
    /// graph order. An empty `groups` request means the implicit `default`
    /// group.
    ///
    /// Not transactional: a [`ActivateError::MissingLoadPath`] halts further
    /// processing, and nodes loaded before the failure stay loaded.
    ///
    /// # Errors
    ///
    /// Propagates the first eager load failure.
    pub fn activate(
        &mut self,
        graph: &LockedGraph,
        groups: &[GroupName],
    ) -> Result<(), ActivateError> {
        let requested: Vec<GroupName> = if groups.is_empty() {
            vec![GroupName::default_group()]
        } else {
            groups.to_vec()
        };

        for node in graph {
            if !node.in_groups(&requested) || self.activated.contains(&node.name) {
                continue;
            }
            match &node.load {
                LoadDirective::Suppressed => {
                    // Never loaded by the engine; manual loads remain possible.
                    tracing::trace!("Skipping suppressed package {}", node.name);
                }
                LoadDirective::Eager(paths) => {
                    if paths.is_empty() {
                        self.loader.load(&default_entry(&node.name))?;
                    } else {
                        for path in paths {
                            self.loader.load(path)?;
                        }
                    }
                    self.activated.insert(node.name.clone());
                }
                LoadDirective::Lazy(triggers) => {
                    self.install_triggers(&node.name, triggers);
                    self.activated.insert(node.name.clone());
                }
            }
        }
        Ok(())
    }

    fn install_triggers(&mut self, name: &PackageName, triggers: &[TriggerSpec]) {
        let keys: Vec<TriggerKey> = triggers.iter().map(TriggerKey::from_spec).collect();
        let constants = keys
            .iter()
            .filter_map(|k| match k {
                TriggerKey::Constant(c) => Some(c.clone()),
                _ => None,
            })
            .collect();

        let slot = self.pending.len();
        self.pending.push(Some(PendingLoad {
            feature: default_entry(name),
            keys: keys.clone(),
            constants,
        }));
        for key in keys {
            self.watches.insert(key, slot);
        }
        tracing::trace!("Installed {} trigger(s) for {}", triggers.len(), name);
    }

    /// Probe whether a constant is present. Reports "not present" for
    /// symbols whose trigger has not fired yet.
    pub fn is_defined(&self, constant: &str) -> bool {
        self.defined.contains(constant)
    }

    /// A reference to a constant. Fires its trigger if one is pending.
    /// Returns whether the symbol resolved.
    ///
    /// # Errors
    ///
    /// Propagates a failed deferred load.
    pub fn touch_constant(&mut self, name: &str) -> Result<bool, ActivateError> {
        self.fire(&TriggerKey::Constant(name.to_string()))
    }

    /// An invocation of a method on the type itself.
    ///
    /// # Errors
    ///
    /// Propagates a failed deferred load.
    pub fn call_type_method(&mut self, type_name: &str, method: &str) -> Result<bool, ActivateError> {
        self.fire(&TriggerKey::TypeMethod(
            type_name.to_string(),
            method.to_string(),
        ))
    }

    /// An invocation of a method on an instance of the type.
    ///
    /// # Errors
    ///
    /// Propagates a failed deferred load.
    pub fn call_instance_method(
        &mut self,
        type_name: &str,
        method: &str,
    ) -> Result<bool, ActivateError> {
        self.fire(&TriggerKey::InstanceMethod(
            type_name.to_string(),
            method.to_string(),
        ))
    }

    /// First trigger to be exercised wins: perform the node's deferred load
    /// once, mark its constants defined, and uninstall every remaining
    /// trigger for the node. Subsequent references resolve natively with no
    /// interception left in place.
    fn fire(&mut self, key: &TriggerKey) -> Result<bool, ActivateError> {
        let Some(slot) = self.watches.get(key).copied() else {
            // No pending watch: resolved iff the symbol is already defined.
            return Ok(match key {
                TriggerKey::Constant(c) => self.defined.contains(c),
                _ => false,
            });
        };

        let Some(pending) = self.pending[slot].take() else {
            return Ok(false);
        };
        self.loader.load(&pending.feature)?;
        for k in &pending.keys {
            self.watches.remove(k);
        }
        self.defined.extend(pending.constants.iter().cloned());
        Ok(true)
    }
}
