//! Home directory layout.

use dirs::home_dir;
use std::path::PathBuf;

/// Returns the primary bale directory, or None if the user's home cannot be resolved.
pub fn try_bale_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("BALE_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".bale"))
}

/// Returns the canonical bale home directory (`~/.bale`).
///
/// # Panics
///
/// Panics if neither `BALE_HOME` is set nor the user's home directory can be
/// resolved.
pub fn bale_home() -> PathBuf {
    try_bale_home().expect("Could not determine home directory. Set BALE_HOME to override.")
}

/// Cache path: ~/.bale/cache
pub fn cache_path() -> PathBuf {
    bale_home().join("cache")
}

/// Shared git clone cache: ~/.bale/cache/git
pub fn git_cache_path() -> PathBuf {
    cache_path().join("git")
}
