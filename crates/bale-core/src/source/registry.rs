//! Indexed registry adapter.
//!
//! A registry is described by a JSON index: a flat list of packages, each
//! with its published releases and their declared dependencies. The index is
//! loaded from a local file or fetched over HTTP once per adapter; all
//! queries afterwards are in-memory.

use super::{Materialized, Source, SourceError};
use crate::USER_AGENT;
use async_trait::async_trait;
use bale_schema::{Constraint, Descriptor, PackageName, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One published release of a package in the registry index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRelease {
    /// Exact version string.
    pub version: Version,
    /// Declared dependencies: name -> constraint.
    #[serde(default)]
    pub deps: BTreeMap<PackageName, Constraint>,
}

/// One package entry in the registry index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Package name.
    pub name: PackageName,
    /// Published releases.
    #[serde(default)]
    pub releases: Vec<IndexRelease>,
}

/// The registry's full package index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryIndex {
    /// All packages known to the registry.
    #[serde(default)]
    pub packages: Vec<IndexEntry>,
}

impl RegistryIndex {
    /// Look up an entry by name.
    pub fn find(&self, name: &PackageName) -> Option<&IndexEntry> {
        self.packages.iter().find(|e| &e.name == name)
    }
}

/// A registry source backed by an in-memory index.
#[derive(Debug)]
pub struct RegistrySource {
    index: RegistryIndex,
    locator: String,
}

impl RegistrySource {
    /// Build a source from an index already in memory.
    pub fn new(index: RegistryIndex, locator: impl Into<String>) -> Self {
        Self {
            index,
            locator: locator.into(),
        }
    }

    /// Load the index from a local JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the file cannot be read or
    /// parsed.
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let locator = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| SourceError::Unavailable {
            locator: locator.clone(),
            detail: e.to_string(),
        })?;
        let index: RegistryIndex =
            serde_json::from_str(&content).map_err(|e| SourceError::Unavailable {
                locator: locator.clone(),
                detail: e.to_string(),
            })?;
        Ok(Self { index, locator })
    }

    /// Fetch the index from an HTTP registry endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] on any HTTP or decode failure.
    pub async fn fetch(url: &str) -> Result<Self, SourceError> {
        tracing::debug!("Fetching registry index from {url}");
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Unavailable {
                locator: url.to_string(),
                detail: e.to_string(),
            })?;
        let index = client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SourceError::Unavailable {
                locator: url.to_string(),
                detail: e.to_string(),
            })?
            .json::<RegistryIndex>()
            .await
            .map_err(|e| SourceError::Unavailable {
                locator: url.to_string(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            index,
            locator: url.to_string(),
        })
    }

    fn entry(&self, name: &PackageName) -> Result<&IndexEntry, SourceError> {
        self.index
            .find(name)
            .ok_or_else(|| SourceError::SpecNotFound {
                name: name.clone(),
                detail: format!("not published in registry {}", self.locator),
            })
    }
}

#[async_trait]
impl Source for RegistrySource {
    async fn list_versions(&self, name: &PackageName) -> Result<Vec<Version>, SourceError> {
        let entry = self.entry(name)?;
        let mut versions: Vec<Version> = entry.releases.iter().map(|r| r.version.clone()).collect();
        versions.sort();
        Ok(versions)
    }

    async fn materialize(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Materialized, SourceError> {
        let entry = self.entry(name)?;
        let release = entry
            .releases
            .iter()
            .find(|r| &r.version == version)
            .ok_or_else(|| SourceError::SpecNotFound {
                name: name.clone(),
                detail: format!("version {version} not published in registry {}", self.locator),
            })?;

        let mut descriptor = Descriptor::new(name.clone(), version.clone());
        descriptor.dependencies = release.deps.clone();

        // Installation and archive extraction are an external collaborator's
        // job; registry materialization carries no file root.
        Ok(Materialized {
            descriptor,
            root: None,
            pin: None,
        })
    }

    fn describe(&self) -> String {
        format!("registry {}", self.locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> RegistryIndex {
        let json = r#"{
            "packages": [
                {
                    "name": "rack",
                    "releases": [
                        { "version": "0.9.1" },
                        { "version": "1.0.0", "deps": { "rack-core": "^1.0" } }
                    ]
                },
                { "name": "rack-core", "releases": [ { "version": "1.0.2" } ] }
            ]
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn lists_versions_ascending() {
        let src = RegistrySource::new(index(), "test");
        let versions = src.list_versions(&PackageName::new("rack")).await.unwrap();
        assert_eq!(
            versions,
            vec![
                Version::parse("0.9.1").unwrap(),
                Version::parse("1.0.0").unwrap()
            ]
        );
    }

    #[tokio::test]
    async fn unknown_name_is_spec_not_found() {
        let src = RegistrySource::new(index(), "test");
        let err = src
            .list_versions(&PackageName::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::SpecNotFound { .. }));
    }

    #[tokio::test]
    async fn materialize_returns_declared_deps_without_root() {
        let src = RegistrySource::new(index(), "test");
        let mat = src
            .materialize(&PackageName::new("rack"), &Version::new(1, 0, 0))
            .await
            .unwrap();
        assert!(mat.root.is_none());
        assert!(mat
            .descriptor
            .dependencies
            .contains_key(&PackageName::new("rack-core")));
    }

    #[tokio::test]
    async fn fetch_loads_index_over_http() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::to_string(&index()).unwrap();
        let mock = server
            .mock("GET", "/index.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let url = format!("{}/index.json", server.url());
        let src = RegistrySource::fetch(&url).await.unwrap();
        let versions = src.list_versions(&PackageName::new("rack")).await.unwrap();
        assert_eq!(versions.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_failure_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/index.json")
            .with_status(500)
            .create_async()
            .await;

        let url = format!("{}/index.json", server.url());
        let err = RegistrySource::fetch(&url).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
