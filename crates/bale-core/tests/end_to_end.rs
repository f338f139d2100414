//! Full pipeline: dependency records against a path source, locked to disk,
//! reloaded, and activated in resolver order.

use bale_core::activation::{ActivationContext, SearchPathLoader};
use bale_core::lockfile::Lockfile;
use bale_core::resolver::{Resolver, SourceSet};
use bale_core::source::GitCache;
use bale_schema::{
    Constraint, Dependency, Descriptor, GroupName, Origin, PackageName, Version, DESCRIPTOR_FILE,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Write one package directory: a descriptor plus its entry file(s).
fn build_lib(root: &Path, name: &str, deps: &[(&str, &str)], entries: &[&str]) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let mut desc = Descriptor::new(PackageName::new(name), Version::new(1, 0, 0));
    for (dep, req) in deps {
        desc = desc.with_dependency(*dep, req.parse::<Constraint>().unwrap());
    }
    std::fs::write(dir.join(DESCRIPTOR_FILE), desc.to_toml().unwrap()).unwrap();
    for entry in entries {
        std::fs::write(dir.join(entry), format!("entry {entry}")).unwrap();
    }
}

/// The canonical manifest from the activation scenarios: seven packages
/// across four groups, with `two -> three -> seven` crossing group lines and
/// `three -> seven` declared dependent-first.
fn fixture(root: &Path) -> Vec<Dependency> {
    build_lib(root, "one", &[], &["baz", "qux"]);
    build_lib(root, "two", &[("three", "=1.0.0")], &["two"]);
    build_lib(root, "three", &[("seven", "=1.0.0")], &["three"]);
    build_lib(root, "four", &[], &["four"]);
    build_lib(root, "six", &[], &["six"]);
    build_lib(root, "seven", &[], &["seven"]);

    let origin = Origin::Path {
        root: root.to_path_buf(),
    };
    let dep = |name: &str| {
        Dependency::new(name, "=1.0.0".parse().unwrap()).with_origin(origin.clone())
    };

    vec![
        dep("one").with_groups(["bar"]).with_eager_paths(["baz", "qux"]),
        dep("two"),
        dep("three").with_groups(["not"]),
        dep("four").suppressed(),
        dep("six").with_groups(["string"]),
        dep("seven").with_groups(["not"]),
    ]
}

async fn resolve_fixture(root: &Path) -> bale_schema::LockedGraph {
    let records = fixture(root);
    let cache = Arc::new(GitCache::new(root.join(".git-cache")));
    let sources = SourceSet::new(cache);
    Resolver::new(&sources).resolve(&records).await.unwrap()
}

#[tokio::test]
async fn activates_requested_groups_in_resolver_order() {
    let tmp = TempDir::new().unwrap();
    let graph = resolve_fixture(tmp.path()).await;

    // default group: two depends on three (group "not"), but dependency
    // edges never widen what gets loaded
    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&graph));
    ctx.activate(&graph, &[]).unwrap();
    assert_eq!(ctx.loader().loaded(), ["two"]);

    // specific group with explicit paths
    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&graph));
    ctx.activate(&graph, &[GroupName::new("bar")]).unwrap();
    assert_eq!(ctx.loader().loaded(), ["baz", "qux"]);

    // default and specific group together
    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&graph));
    ctx.activate(&graph, &[GroupName::default_group(), GroupName::new("bar")])
        .unwrap();
    assert_eq!(ctx.loader().loaded(), ["baz", "qux", "two"]);

    // resolver order, not manifest order: three was declared before seven
    // but depends on it
    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&graph));
    ctx.activate(&graph, &[GroupName::new("not")]).unwrap();
    assert_eq!(ctx.loader().loaded(), ["seven", "three"]);
}

#[tokio::test]
async fn suppressed_packages_never_load_but_stay_loadable_manually() {
    let tmp = TempDir::new().unwrap();
    let graph = resolve_fixture(tmp.path()).await;

    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&graph));
    ctx.activate(&graph, &[]).unwrap();
    assert!(!ctx.loader().loaded().contains(&"four".to_string()));

    // Manual load by file path remains the caller's prerogative.
    let mut loader = SearchPathLoader::from_graph(&graph);
    bale_core::activation::Loader::load(&mut loader, "four").unwrap();
    assert_eq!(loader.loaded(), ["four"]);
}

#[tokio::test]
async fn lock_round_trip_preserves_graph_and_needs_no_sources() {
    let tmp = TempDir::new().unwrap();
    let graph = resolve_fixture(tmp.path()).await;

    let lock_path = tmp.path().join("bale.lock");
    Lockfile::save(&graph, &lock_path).await.unwrap();
    let reloaded = Lockfile::load(&lock_path).await.unwrap().unwrap();
    assert_eq!(reloaded, graph);

    // Activation straight off the stored graph: no SourceSet, no resolver,
    // no adapter exists in this scope at all.
    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&reloaded));
    ctx.activate(&reloaded, &[GroupName::new("not")]).unwrap();
    assert_eq!(ctx.loader().loaded(), ["seven", "three"]);
}

#[tokio::test]
async fn transitive_dependency_is_set_up_but_never_auto_loaded() {
    // `seven` only as a transitive dep of `three` (not declared top-level):
    // it resolves into the graph and lands on the search path, but only
    // declared records load when their group activates.
    let tmp = TempDir::new().unwrap();
    build_lib(tmp.path(), "three", &[("seven", "=1.0.0")], &["three"]);
    build_lib(tmp.path(), "seven", &[], &["seven"]);

    let records = vec![Dependency::new("three", "=1.0.0".parse().unwrap())
        .with_origin(Origin::Path {
            root: tmp.path().to_path_buf(),
        })
        .with_groups(["not"])];

    let cache = Arc::new(GitCache::new(tmp.path().join(".git-cache")));
    let sources = SourceSet::new(cache);
    let graph = Resolver::new(&sources).resolve(&records).await.unwrap();
    assert!(graph.find(&PackageName::new("seven")).is_some());

    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&graph));
    ctx.activate(&graph, &[GroupName::new("not")]).unwrap();
    assert_eq!(ctx.loader().loaded(), ["three"]);

    // Manual loading of the set-up dependency remains available.
    let mut loader = SearchPathLoader::from_graph(&graph);
    bale_core::activation::Loader::load(&mut loader, "seven").unwrap();
    assert_eq!(loader.loaded(), ["seven"]);
}

#[tokio::test]
async fn lazy_package_loads_on_first_reference_only() {
    let tmp = TempDir::new().unwrap();
    build_lib(tmp.path(), "slow_lib", &[], &["slow_lib"]);

    let records = vec![Dependency::new("slow_lib", "=1.0.0".parse().unwrap())
        .with_origin(Origin::Path {
            root: tmp.path().to_path_buf(),
        })
        .autoload()];

    let cache = Arc::new(GitCache::new(tmp.path().join(".git-cache")));
    let sources = SourceSet::new(cache);
    let graph = Resolver::new(&sources).resolve(&records).await.unwrap();

    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&graph));
    ctx.activate(&graph, &[]).unwrap();

    assert!(!ctx.is_defined("SlowLib"));
    assert!(ctx.loader().loaded().is_empty());

    assert!(ctx.touch_constant("SlowLib").unwrap());
    assert!(ctx.is_defined("SlowLib"));
    assert_eq!(ctx.loader().loaded(), ["slow_lib"]);

    assert!(ctx.touch_constant("SlowLib").unwrap());
    assert_eq!(ctx.loader().loaded(), ["slow_lib"]);
}

#[tokio::test]
async fn missing_eager_path_fails_with_load_error_not_resolution_error() {
    let tmp = TempDir::new().unwrap();
    build_lib(tmp.path(), "two", &[], &["two"]);

    let records = vec![Dependency::new("two", "=1.0.0".parse().unwrap())
        .with_origin(Origin::Path {
            root: tmp.path().to_path_buf(),
        })
        .with_eager_paths(["fail"])];

    let cache = Arc::new(GitCache::new(tmp.path().join(".git-cache")));
    let sources = SourceSet::new(cache);
    // Resolution itself succeeds; the failure belongs to the loading layer.
    let graph = Resolver::new(&sources).resolve(&records).await.unwrap();

    let mut ctx = ActivationContext::new(SearchPathLoader::from_graph(&graph));
    let err = ctx.activate(&graph, &[]).unwrap_err();
    assert_eq!(err.to_string(), "no such file to load -- fail");
}
