//! Local path adapter.
//!
//! A path source points at a directory containing packages as plain
//! directories: the root itself, or any direct child, counts as a package if
//! it carries a descriptor file. Nothing is copied; materialization hands
//! back the package directory as the file root.

use super::{Materialized, Source, SourceError};
use async_trait::async_trait;
use bale_schema::{Descriptor, DescriptorError, PackageName, Version, DESCRIPTOR_FILE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A source backed by a local directory of packages.
#[derive(Debug)]
pub struct PathSource {
    root: PathBuf,
    packages: HashMap<PackageName, (Descriptor, PathBuf)>,
    // dir basename -> parse error, for directories whose descriptor exists
    // but cannot be evaluated
    broken: HashMap<String, String>,
}

impl PathSource {
    /// Scan `root` for package descriptors.
    ///
    /// Broken descriptors do not poison the scan: a package that is never
    /// requested stays invisible, while requesting a name whose descriptor
    /// exists but cannot be evaluated surfaces
    /// [`SourceError::MetadataInvalid`].
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the root directory cannot be
    /// read at all.
    pub fn scan(root: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let root = root.into();
        let mut packages = HashMap::new();
        let mut broken = HashMap::new();

        let mut candidates = vec![root.clone()];
        match std::fs::read_dir(&root) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if entry.path().is_dir() {
                        candidates.push(entry.path());
                    }
                }
            }
            Err(e) => {
                return Err(SourceError::Unavailable {
                    locator: root.display().to_string(),
                    detail: e.to_string(),
                });
            }
        }

        for dir in candidates {
            if !dir.join(DESCRIPTOR_FILE).exists() {
                continue;
            }
            match Descriptor::read_from(&dir) {
                Ok(desc) => {
                    packages.insert(desc.name.clone(), (desc, dir));
                }
                Err(DescriptorError::Missing(_)) => {}
                Err(e) => {
                    tracing::warn!("Skipping unreadable descriptor in {}: {e}", dir.display());
                    if let Some(basename) = dir.file_name().and_then(|n| n.to_str()) {
                        broken.insert(basename.to_string(), e.to_string());
                    }
                }
            }
        }

        Ok(Self {
            root,
            packages,
            broken,
        })
    }

    fn lookup(&self, name: &PackageName) -> Result<&(Descriptor, PathBuf), SourceError> {
        if let Some(pkg) = self.packages.get(name) {
            return Ok(pkg);
        }
        if let Some(detail) = self.broken.get(name.as_str()) {
            return Err(SourceError::MetadataInvalid {
                name: name.clone(),
                detail: detail.clone(),
            });
        }
        Err(SourceError::SpecNotFound {
            name: name.clone(),
            detail: format!("no package directory under {}", self.root.display()),
        })
    }

    /// Directory scanned by this source.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Source for PathSource {
    async fn list_versions(&self, name: &PackageName) -> Result<Vec<Version>, SourceError> {
        let (desc, _) = self.lookup(name)?;
        Ok(vec![desc.version.clone()])
    }

    async fn materialize(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Materialized, SourceError> {
        let (desc, dir) = self.lookup(name)?;
        if &desc.version != version {
            return Err(SourceError::SpecNotFound {
                name: name.clone(),
                detail: format!("Source contains '{name}' at: {}", desc.version),
            });
        }
        Ok(Materialized {
            descriptor: desc.clone(),
            root: Some(dir.clone()),
            pin: None,
        })
    }

    fn describe(&self) -> String {
        format!("path {}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_schema::Constraint;
    use tempfile::TempDir;

    fn write_lib(root: &Path, name: &str, version: &str, deps: &[(&str, &str)]) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let mut desc = Descriptor::new(
            PackageName::new(name),
            Version::parse(version).unwrap(),
        );
        for (dep, req) in deps {
            desc = desc.with_dependency(*dep, req.parse::<Constraint>().unwrap());
        }
        std::fs::write(dir.join(DESCRIPTOR_FILE), desc.to_toml().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn scans_children_for_descriptors() {
        let tmp = TempDir::new().unwrap();
        write_lib(tmp.path(), "one", "1.0.0", &[]);
        write_lib(tmp.path(), "two", "1.0.0", &[("three", "=1.0.0")]);

        let src = PathSource::scan(tmp.path()).unwrap();
        let versions = src.list_versions(&PackageName::new("two")).await.unwrap();
        assert_eq!(versions, vec![Version::new(1, 0, 0)]);

        let mat = src
            .materialize(&PackageName::new("two"), &Version::new(1, 0, 0))
            .await
            .unwrap();
        assert_eq!(mat.root.as_deref(), Some(tmp.path().join("two").as_path()));
        assert!(mat
            .descriptor
            .dependencies
            .contains_key(&PackageName::new("three")));
    }

    #[tokio::test]
    async fn version_mismatch_reports_what_the_source_contains() {
        let tmp = TempDir::new().unwrap();
        write_lib(tmp.path(), "foo", "1.0.0", &[]);

        let src = PathSource::scan(tmp.path()).unwrap();
        let err = src
            .materialize(&PackageName::new("foo"), &Version::new(1, 1, 0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Source contains 'foo' at: 1.0.0"));
    }

    #[tokio::test]
    async fn broken_descriptor_is_metadata_invalid_when_requested() {
        let tmp = TempDir::new().unwrap();
        write_lib(tmp.path(), "ok", "1.0.0", &[]);
        let bad = tmp.path().join("bad");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join(DESCRIPTOR_FILE), "version = [nope").unwrap();

        let src = PathSource::scan(tmp.path()).unwrap();
        // Unrelated packages resolve fine.
        assert!(src.list_versions(&PackageName::new("ok")).await.is_ok());
        // The broken one is a metadata failure, not "not found".
        let err = src.list_versions(&PackageName::new("bad")).await.unwrap_err();
        assert!(matches!(err, SourceError::MetadataInvalid { .. }));
    }

    #[tokio::test]
    async fn missing_root_is_unavailable() {
        let err = PathSource::scan("/definitely/not/here").unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
        // The locator rides along in the rendering; there is no underlying
        // error chained beneath it.
        assert!(err.to_string().contains("/definitely/not/here"));
        assert!(std::error::Error::source(&err).is_none());
    }
}
