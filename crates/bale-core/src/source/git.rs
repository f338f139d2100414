//! Version-control source adapter.
//!
//! Clones are shared: the first use of a remote performs a full clone into a
//! cache directory keyed by a hash of the locator, and every later use reuses
//! it. The shared clone is only ever a fetch target; every tree handed out
//! comes from an immutable per-revision checkout directory beside it, so
//! adapters tracking different refs of one remote never disturb each other.
//! Floating references (default branch or a branch name) are re-fetched once
//! per resolution run and resolved to the revision at the remote tip; an
//! explicitly pinned revision never touches the network again once its
//! checkout exists.
//!
//! Subprocess failures are classified before surfacing: transport-level
//! failures (unreachable host, rejected key, hung-up remote) become
//! [`SourceError::Transport`], unknown refs or revisions become
//! [`SourceError::RefNotFound`]. Both carry the remote locator and git's
//! stderr verbatim.

use super::{Materialized, Source, SourceError};
use async_trait::async_trait;
use bale_schema::{
    Descriptor, DescriptorError, GitReference, PackageName, Version, DESCRIPTOR_FILE,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Shared clone cache, one per process (or per test).
///
/// Concurrent fetches against the *same* locator are serialized through a
/// per-locator lock; distinct locators proceed fully in parallel.
#[derive(Debug)]
pub struct GitCache {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GitCache {
    /// Create a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a cache at the default location (`~/.bale/cache/git`).
    pub fn at_default() -> Self {
        Self::new(crate::paths::git_cache_path())
    }

    /// Cache directory for a remote: `<basename>-<sha256(remote)[..12]>`.
    pub fn clone_dir(&self, remote: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(remote.as_bytes()));
        let base = remote
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or("repo")
            .trim_end_matches(".git");
        let base: String = base
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
            .collect();
        self.root.join(format!("{base}-{}", &digest[..12]))
    }

    async fn locator_lock(&self, remote: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(remote.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// A source adapter tracking one git remote.
#[derive(Debug)]
pub struct GitSource {
    remote: String,
    reference: GitReference,
    cache: Arc<GitCache>,
    // revision a floating ref resolved to on first fetch within this run
    resolved_rev: std::sync::Mutex<Option<String>>,
}

impl GitSource {
    /// Create an adapter for `remote` tracking `reference`.
    ///
    /// One `GitSource` corresponds to one resolution run: floating refs are
    /// fetched at most once per instance and stay at the revision that fetch
    /// observed.
    pub fn new(remote: impl Into<String>, reference: GitReference, cache: Arc<GitCache>) -> Self {
        Self {
            remote: remote.into(),
            reference,
            cache,
            resolved_rev: std::sync::Mutex::new(None),
        }
    }

    /// The remote locator this adapter tracks.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, SourceError> {
        let git = which::which("git").map_err(|e| SourceError::Unavailable {
            locator: self.remote.clone(),
            detail: format!("git executable not found: {e}"),
        })?;

        let mut cmd = Command::new(git);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        tracing::trace!("git {}", args.join(" "));

        let output = cmd.output().await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Err(classify_git_failure(&self.remote, stderr))
    }

    /// Make sure the shared clone exists and hand out the per-revision
    /// checkout for this adapter's reference.
    ///
    /// Must be called with the locator lock held.
    async fn ensure_checkout(&self) -> Result<PathBuf, SourceError> {
        let clone_dir = self.cache.clone_dir(&self.remote);

        if let GitReference::Revision(rev) = &self.reference {
            // Pinned checkouts are immutable: once present, no subprocess
            // runs at all for this revision.
            let checkout = checkout_dir(&clone_dir, rev);
            if checkout.join(".git").exists() {
                return Ok(checkout);
            }
            self.ensure_clone(&clone_dir).await?;
            if self.rev_exists(&clone_dir, rev).await.is_err() {
                self.fetch(&clone_dir).await?;
            }
            return self.revision_checkout(&clone_dir, rev).await;
        }

        // Floating refs resolve to the revision at the remote tip once per
        // run, then take the same per-revision checkout path as pins. The
        // shared clone's own working tree is never handed out, so adapters
        // tracking different branches of one remote cannot clobber each
        // other.
        let known = self.resolved_rev.lock().expect("revision lock poisoned").clone();
        if let Some(rev) = known {
            return self.revision_checkout(&clone_dir, &rev).await;
        }

        let fresh_clone = !clone_dir.join(".git").exists();
        self.ensure_clone(&clone_dir).await?;
        let rev = if fresh_clone {
            // A clone performed just now is already at the requested tip.
            self.head_revision(&clone_dir).await?
        } else {
            self.fetch(&clone_dir).await?;
            self.run_git(&["rev-parse", "FETCH_HEAD"], Some(&clone_dir))
                .await?
        };
        *self.resolved_rev.lock().expect("revision lock poisoned") = Some(rev.clone());
        self.revision_checkout(&clone_dir, &rev).await
    }

    /// Materialize `checkouts/<rev>` from the shared clone.
    async fn revision_checkout(&self, clone_dir: &Path, rev: &str) -> Result<PathBuf, SourceError> {
        let checkout = checkout_dir(clone_dir, rev);
        if checkout.join(".git").exists() {
            return Ok(checkout);
        }
        std::fs::create_dir_all(checkout.parent().unwrap_or(clone_dir))?;
        self.run_git(
            &[
                "clone",
                "--no-checkout",
                &clone_dir.display().to_string(),
                &checkout.display().to_string(),
            ],
            None,
        )
        .await?;
        self.run_git(&["checkout", "-q", rev], Some(&checkout))
            .await
            .map_err(|e| match e {
                // A bad pin inside an otherwise healthy clone is a ref
                // problem, whatever git printed.
                SourceError::Transport { remote, diagnostic } => {
                    SourceError::RefNotFound { remote, diagnostic }
                }
                other => other,
            })?;
        Ok(checkout)
    }

    async fn ensure_clone(&self, clone_dir: &Path) -> Result<(), SourceError> {
        if clone_dir.join(".git").exists() {
            return Ok(());
        }
        tracing::debug!("Cloning {} into {}", self.remote, clone_dir.display());
        std::fs::create_dir_all(clone_dir.parent().unwrap_or(clone_dir))?;
        let mut args = vec!["clone"];
        if let GitReference::Branch(branch) = &self.reference {
            args.extend(["--branch", branch]);
        }
        let dest = clone_dir.display().to_string();
        args.extend([self.remote.as_str(), dest.as_str()]);
        self.run_git(&args, None).await?;
        Ok(())
    }

    async fn fetch(&self, clone_dir: &Path) -> Result<(), SourceError> {
        tracing::debug!("Fetching {} (floating ref)", self.remote);
        let refspec = match &self.reference {
            GitReference::Branch(branch) => branch.clone(),
            _ => "HEAD".to_string(),
        };
        self.run_git(&["fetch", "origin", &refspec], Some(clone_dir))
            .await?;
        Ok(())
    }

    async fn rev_exists(&self, clone_dir: &Path, rev: &str) -> Result<(), SourceError> {
        self.run_git(&["cat-file", "-e", &format!("{rev}^{{commit}}")], Some(clone_dir))
            .await
            .map(|_| ())
    }

    async fn head_revision(&self, dir: &Path) -> Result<String, SourceError> {
        self.run_git(&["rev-parse", "HEAD"], Some(dir)).await
    }

    /// Locate the descriptor for `name` in a checkout: the tree root first,
    /// then direct child directories (repositories may carry several
    /// packages, or run the descriptor from a subdirectory).
    fn find_descriptor(
        tree: &Path,
        name: &PackageName,
    ) -> Result<Option<(Descriptor, PathBuf)>, DescriptorError> {
        let mut invalid: Option<DescriptorError> = None;
        let mut candidates = vec![tree.to_path_buf()];
        if let Ok(entries) = std::fs::read_dir(tree) {
            for entry in entries.flatten() {
                if entry.path().is_dir() && entry.path().join(DESCRIPTOR_FILE).exists() {
                    candidates.push(entry.path());
                }
            }
        }

        for dir in candidates {
            match Descriptor::read_from(&dir) {
                Ok(desc) if &desc.name == name => return Ok(Some((desc, dir))),
                Ok(_) => {}
                Err(DescriptorError::Missing(_)) => {}
                Err(e) => invalid = Some(e),
            }
        }

        match invalid {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn checkout_locked(&self) -> Result<PathBuf, SourceError> {
        let lock = self.cache.locator_lock(&self.remote).await;
        let _guard = lock.lock().await;
        self.ensure_checkout().await
    }
}

#[async_trait]
impl Source for GitSource {
    async fn list_versions(&self, name: &PackageName) -> Result<Vec<Version>, SourceError> {
        let tree = self.checkout_locked().await?;
        match Self::find_descriptor(&tree, name) {
            Ok(Some((desc, _))) => Ok(vec![desc.version]),
            Ok(None) => Err(SourceError::SpecNotFound {
                name: name.clone(),
                detail: format!("no descriptor for '{name}' in {}", self.remote),
            }),
            Err(e) => Err(SourceError::MetadataInvalid {
                name: name.clone(),
                detail: e.to_string(),
            }),
        }
    }

    async fn materialize(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Materialized, SourceError> {
        let tree = self.checkout_locked().await?;
        let pin = match &self.reference {
            GitReference::Revision(rev) => rev.clone(),
            _ => self.head_revision(&tree).await?,
        };

        match Self::find_descriptor(&tree, name) {
            Ok(Some((desc, dir))) => {
                if &desc.version != version {
                    return Err(SourceError::SpecNotFound {
                        name: name.clone(),
                        detail: format!("Source contains '{name}' at: {}", desc.version),
                    });
                }
                Ok(Materialized {
                    descriptor: desc,
                    root: Some(dir),
                    pin: Some(pin),
                })
            }
            // No descriptor, or one that cannot be evaluated: the caller
            // supplied an explicit version (the only way to reach materialize
            // without a successful listing), so fake a minimal descriptor
            // rather than failing the whole resolution. Packages that ship no
            // metadata stay installable.
            Ok(None) => Ok(Materialized {
                descriptor: Descriptor::new(name.clone(), version.clone()),
                root: Some(tree),
                pin: Some(pin),
            }),
            Err(e) => {
                tracing::warn!(
                    "Descriptor for '{name}' in {} is invalid ({e}); substituting a placeholder",
                    self.remote
                );
                Ok(Materialized {
                    descriptor: Descriptor::new(name.clone(), version.clone()),
                    root: Some(tree),
                    pin: Some(pin),
                })
            }
        }
    }

    fn describe(&self) -> String {
        format!("git {}", self.remote)
    }
}

/// Per-revision checkout directory beside a shared clone.
fn checkout_dir(clone_dir: &Path, rev: &str) -> PathBuf {
    let short = rev.get(..12).unwrap_or(rev);
    clone_dir.join("checkouts").join(short)
}

/// Signatures of transport-level failures in git's stderr.
const TRANSPORT_SIGNATURES: &[&str] = &[
    "Could not resolve host",
    "unable to access",
    "Connection refused",
    "Connection timed out",
    "Permission denied",
    "publickey",
    "Host key verification failed",
    "remote end hung up",
    "does not appear to be a git repository",
    "does not exist",
    "ssh:",
];

/// Signatures of missing-ref failures in git's stderr.
const REF_SIGNATURES: &[&str] = &[
    "couldn't find remote ref",
    "Remote branch",
    "unknown revision",
    "bad revision",
    "did not match any",
    "not a valid ref",
    "reference is not a tree",
    "pathspec",
];

/// Classify a failed git subprocess by its stderr, preserving the diagnostic
/// text verbatim.
fn classify_git_failure(remote: &str, stderr: String) -> SourceError {
    if TRANSPORT_SIGNATURES.iter().any(|sig| stderr.contains(sig)) {
        return SourceError::Transport {
            remote: remote.to_string(),
            diagnostic: stderr,
        };
    }
    if REF_SIGNATURES.iter().any(|sig| stderr.contains(sig)) {
        return SourceError::RefNotFound {
            remote: remote.to_string(),
            diagnostic: stderr,
        };
    }
    // Unrecognized fatals are transport-shaped: the remote could not be
    // spoken to as a repository.
    SourceError::Transport {
        remote: remote.to_string(),
        diagnostic: stderr,
    }
}
