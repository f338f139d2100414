//! Dependency records.
//!
//! A [`Dependency`] is the immutable description of one requested package as
//! handed over by the manifest front-end: a name, a version constraint, an
//! optional explicit origin, a non-empty set of group tags, and a load
//! directive controlling how the activation engine treats the package.

use crate::constraint::Constraint;
use crate::name::{GroupName, PackageName};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a package is fetched from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Origin {
    /// No explicit origin: resolve against all configured registries.
    Registry,
    /// A version-control remote, optionally pinned to a ref or revision.
    Git {
        /// Remote locator (URL or local repository path).
        remote: String,
        /// Which ref to track.
        #[serde(default)]
        reference: GitReference,
    },
    /// A local directory containing one or more package descriptors.
    Path {
        /// Root directory to scan.
        root: PathBuf,
    },
}

/// Which point of a git remote a dependency tracks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "ref", content = "value", rename_all = "lowercase")]
pub enum GitReference {
    /// Track the remote's default branch tip (floating).
    #[default]
    DefaultBranch,
    /// Track a named branch tip (floating).
    Branch(String),
    /// An exact revision (pinned; immutable once materialized).
    Revision(String),
}

impl GitReference {
    /// Whether this reference floats with the remote (re-fetched every fresh
    /// resolution run) rather than naming an immutable revision.
    pub fn is_floating(&self) -> bool {
        !matches!(self, Self::Revision(_))
    }
}

/// A watch installed by a lazy load directive.
///
/// The first trigger of a node to be exercised performs the node's default
/// load and cancels the node's remaining triggers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "on", rename_all = "lowercase")]
pub enum TriggerSpec {
    /// Fires on the first reference to a constant.
    Constant {
        /// Constant name watched.
        name: String,
    },
    /// Fires on the first invocation of a method on the type itself.
    TypeMethod {
        /// Type the method belongs to.
        type_name: String,
        /// Method name watched.
        method: String,
    },
    /// Fires on the first invocation of a method on an instance of the type.
    InstanceMethod {
        /// Type the method belongs to.
        type_name: String,
        /// Method name watched.
        method: String,
    },
}

impl TriggerSpec {
    /// Parse a trigger shorthand: `Type.method` is a type method,
    /// `Type#method` an instance method, anything else a constant.
    pub fn parse(spec: &str) -> Self {
        if let Some((type_name, method)) = spec.split_once('.') {
            return Self::TypeMethod {
                type_name: type_name.to_string(),
                method: method.to_string(),
            };
        }
        if let Some((type_name, method)) = spec.split_once('#') {
            return Self::InstanceMethod {
                type_name: type_name.to_string(),
                method: method.to_string(),
            };
        }
        Self::Constant {
            name: spec.to_string(),
        }
    }
}

/// How the activation engine treats a resolved package.
///
/// Exactly one variant is active per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum LoadDirective {
    /// Load at activation time, in resolver order. An empty path list means
    /// "infer the default entry from the package name".
    Eager(Vec<String>),
    /// Never loaded by the engine; the caller may still load it manually.
    Suppressed,
    /// Deferred: install the given triggers and load on first use.
    Lazy(Vec<TriggerSpec>),
}

impl Default for LoadDirective {
    fn default() -> Self {
        Self::Eager(Vec::new())
    }
}

/// Immutable description of one requested package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name, unique within one manifest.
    pub name: PackageName,
    /// Version requirement.
    pub constraint: Constraint,
    /// Where to resolve the package from.
    pub origin: Origin,
    /// Group tags; never empty (defaults to `[default]`).
    pub groups: Vec<GroupName>,
    /// Load directive for the activation engine.
    pub load: LoadDirective,
}

impl Dependency {
    /// Create a record with the implicit `default` group, registry origin,
    /// and default eager load.
    pub fn new(name: impl Into<PackageName>, constraint: Constraint) -> Self {
        Self {
            name: name.into(),
            constraint,
            origin: Origin::Registry,
            groups: vec![GroupName::default_group()],
            load: LoadDirective::Eager(Vec::new()),
        }
    }

    /// Replace the group set. An empty iterator falls back to `[default]`.
    pub fn with_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupName>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        if self.groups.is_empty() {
            self.groups = vec![GroupName::default_group()];
        }
        self
    }

    /// Set an explicit origin.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Eagerly load the given paths instead of the inferred default entry.
    pub fn with_eager_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load = LoadDirective::Eager(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Suppress loading entirely (`require => false` in the manifest syntax).
    pub fn suppressed(mut self) -> Self {
        self.load = LoadDirective::Suppressed;
        self
    }

    /// Lazy-load on the inferred namespace constant (`autoload => true`).
    pub fn autoload(mut self) -> Self {
        self.load = LoadDirective::Lazy(vec![TriggerSpec::Constant {
            name: infer_namespace(self.name.as_str()),
        }]);
        self
    }

    /// Lazy-load on the given trigger shorthands (`autoload => [...]`).
    pub fn autoload_on<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.load = LoadDirective::Lazy(
            specs
                .into_iter()
                .map(|s| TriggerSpec::parse(s.as_ref()))
                .collect(),
        );
        self
    }

    /// Whether any of this record's groups appears in `requested`.
    pub fn in_groups(&self, requested: &[GroupName]) -> bool {
        self.groups.iter().any(|g| requested.contains(g))
    }
}

/// Infer the namespace constant implied by a package name.
///
/// Splits the name on runs of non-alphanumeric characters (underscore
/// included), upper-cases the first letter of each segment, concatenates the
/// segments, and prefixes an underscore if the result begins with a digit.
///
/// ```
/// use bale_schema::infer_namespace;
/// assert_eq!(infer_namespace("slow-lib"), "SlowLib");
/// assert_eq!(infer_namespace("slow_lib"), "SlowLib");
/// assert_eq!(infer_namespace("99designs"), "_99designs");
/// ```
pub fn infer_namespace(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut boundary = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if boundary {
                out.extend(ch.to_uppercase());
                boundary = false;
            } else {
                out.push(ch);
            }
        } else {
            boundary = true;
        }
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Infer the default entry file for a package: the name with dashes
/// normalized to path separators. Underscores are preserved.
pub fn default_entry(name: &PackageName) -> String {
    name.as_str().replace('-', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_namespace_table() {
        assert_eq!(infer_namespace("slow_lib"), "SlowLib");
        assert_eq!(infer_namespace("slow-lib"), "SlowLib");
        assert_eq!(infer_namespace("rack"), "Rack");
        assert_eq!(infer_namespace("net--http"), "NetHttp");
        assert_eq!(infer_namespace("99designs"), "_99designs");
        assert_eq!(infer_namespace("a1-b2"), "A1B2");
    }

    #[test]
    fn default_entry_normalizes_dashes_only() {
        assert_eq!(default_entry(&PackageName::new("slow_lib")), "slow_lib");
        assert_eq!(default_entry(&PackageName::new("foo-bar")), "foo/bar");
    }

    #[test]
    fn trigger_shorthand_parsing() {
        assert_eq!(
            TriggerSpec::parse("SlowLib"),
            TriggerSpec::Constant {
                name: "SlowLib".into()
            }
        );
        assert_eq!(
            TriggerSpec::parse("Module.foo"),
            TriggerSpec::TypeMethod {
                type_name: "Module".into(),
                method: "foo".into()
            }
        );
        assert_eq!(
            TriggerSpec::parse("Module#foo"),
            TriggerSpec::InstanceMethod {
                type_name: "Module".into(),
                method: "foo".into()
            }
        );
    }

    #[test]
    fn autoload_true_expands_to_inferred_constant() {
        let dep = Dependency::new("slow_lib", Constraint::any()).autoload();
        assert_eq!(
            dep.load,
            LoadDirective::Lazy(vec![TriggerSpec::Constant {
                name: "SlowLib".into()
            }])
        );
    }

    #[test]
    fn empty_groups_fall_back_to_default() {
        let dep = Dependency::new("rack", Constraint::any()).with_groups(Vec::<GroupName>::new());
        assert_eq!(dep.groups, vec![GroupName::default_group()]);
    }
}
