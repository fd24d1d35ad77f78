//! Ecosystem registry access: list available versions of a package, download its
//! archive. A real client talks to an HTTP registry over `reqwest`; a fake client
//! backs tests and offline development with an in-memory catalog.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::resolver::error::{Result, ResolverError};

#[async_trait]
pub trait EcosystemRegistryClient: Send + Sync + std::fmt::Debug {
    /// Lists every published version string for `name`. Does not filter by a
    /// specifier — the caller applies `VersionSpecifier::satisfies` to the result.
    async fn list_versions(&self, name: &str) -> Result<Vec<String>>;

    /// Downloads the `.tar.gz` archive for `name@version` to `dest_file`.
    async fn download_archive(&self, name: &str, version: &str, dest_file: &Path) -> Result<()>;
}

/// Talks to a real HTTP package registry: `GET {base_url}/{name}/versions` returns
/// a JSON array of version strings, `GET {base_url}/{name}/{version}/archive`
/// streams the archive bytes.
#[derive(Debug)]
pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EcosystemRegistryClient for HttpRegistryClient {
    async fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}/versions", self.base_url, name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolverError::RegistryRequestFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| ResolverError::RegistryRequestFailed {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    async fn download_archive(&self, name: &str, version: &str, dest_file: &Path) -> Result<()> {
        let url = format!("{}/{}/{}/archive", self.base_url, name, version);
        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| ResolverError::DownloadFailed {
                    name: name.to_string(),
                    version: version.to_string(),
                    message: e.to_string(),
                })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ResolverError::DownloadFailed {
                name: name.to_string(),
                version: version.to_string(),
                message: e.to_string(),
            })?;
        tokio::fs::write(dest_file, &bytes)
            .await
            .map_err(|e| ResolverError::DownloadFailed {
                name: name.to_string(),
                version: version.to_string(),
                message: e.to_string(),
            })
    }
}

/// An in-memory catalog, for tests and for environments with no reachable
/// registry. Archives it "downloads" are empty `.tar.gz` streams containing a
/// single marker file, so cache-path and version-resolution behavior can be
/// exercised without network access.
#[derive(Debug, Default)]
pub struct FakeRegistryClient {
    catalog: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeRegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_versions(name: impl Into<String>, versions: Vec<&str>) -> Self {
        let client = Self::new();
        client.catalog.lock().unwrap().insert(
            name.into(),
            versions.into_iter().map(str::to_string).collect(),
        );
        client
    }

    pub fn seed(&self, name: impl Into<String>, versions: Vec<&str>) {
        self.catalog
            .lock()
            .unwrap()
            .insert(name.into(), versions.into_iter().map(str::to_string).collect());
    }
}

#[async_trait]
impl EcosystemRegistryClient for FakeRegistryClient {
    async fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        self.catalog
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ResolverError::RegistryRequestFailed {
                name: name.to_string(),
                message: "package not in fake catalog".to_string(),
            })
    }

    async fn download_archive(&self, name: &str, version: &str, dest_file: &Path) -> Result<()> {
        use std::io::Write;
        let marker_name = format!("{name}-{version}.marker");
        let mut builder = tar::Builder::new(Vec::new());
        let data = marker_name.as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, &marker_name, data)
            .map_err(|e| ResolverError::DownloadFailed {
                name: name.to_string(),
                version: version.to_string(),
                message: e.to_string(),
            })?;
        let tar_bytes = builder.into_inner().map_err(|e| ResolverError::DownloadFailed {
            name: name.to_string(),
            version: version.to_string(),
            message: e.to_string(),
        })?;

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).map_err(|e| ResolverError::DownloadFailed {
            name: name.to_string(),
            version: version.to_string(),
            message: e.to_string(),
        })?;
        let gz_bytes = encoder.finish().map_err(|e| ResolverError::DownloadFailed {
            name: name.to_string(),
            version: version.to_string(),
            message: e.to_string(),
        })?;

        tokio::fs::write(dest_file, gz_bytes)
            .await
            .map_err(|e| ResolverError::DownloadFailed {
                name: name.to_string(),
                version: version.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fake_client_lists_seeded_versions() {
        let client = FakeRegistryClient::with_versions("Library", vec!["1.0.0", "1.2.7"]);
        let versions = client.list_versions("Library").await.unwrap();
        assert_eq!(versions, vec!["1.0.0".to_string(), "1.2.7".to_string()]);
    }

    #[tokio::test]
    async fn fake_client_download_writes_a_valid_archive() {
        let client = FakeRegistryClient::with_versions("Library", vec!["1.0.0"]);
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("archive.tar.gz");
        client.download_archive("Library", "1.0.0", &dest).await.unwrap();
        assert!(dest.exists());
        assert!(std::fs::metadata(&dest).unwrap().len() > 0);
    }
}
