//! Upstream registry access: metadata documents and tarball streams.

use crate::error::MirrorError;
use crate::types::PackageVersion;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Distribution block of a published version.
#[derive(Debug, Deserialize)]
pub(crate) struct Dist {
    /// Absolute URL of the version's tarball.
    pub tarball: String,
    /// `sha512-<base64>` digest; absent on some very old packages.
    #[serde(default)]
    pub integrity: String,
}

/// Per-version entry of a registry metadata document.
///
/// Fields the engine does not consume are ignored by serde.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionEntry {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: HashMap<String, String>,
    pub dist: Dist,
}

/// The full metadata document for a package.
#[derive(Debug, Deserialize)]
pub(crate) struct RegistryDocument {
    #[serde(default)]
    pub versions: HashMap<String, VersionEntry>,
    /// Publication timestamps keyed by version string (plus the
    /// `created`/`modified` entries npm adds, which are never looked up).
    #[serde(default)]
    pub time: HashMap<String, DateTime<Utc>>,
}

/// HTTP client for an npm-compatible registry.
///
/// Issues plain GETs and surfaces the response body as a stream; the
/// caller owns consuming it. Retrying is the workers' concern.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    /// Creates a client for the registry at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        RegistryClient {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetches the metadata document for a package.
    ///
    /// The package name is URL-encoded, so scoped names like
    /// `@babel/core` become a single path segment. Any status other
    /// than 200 is an error.
    pub async fn fetch_metadata(&self, name: &str) -> Result<reqwest::Response, MirrorError> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(name));
        debug!("Fetching metadata from {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(MirrorError::DownloadFailed(format!(
                "unexpected status {} fetching metadata from {}",
                status.as_u16(),
                url
            )));
        }
        Ok(response)
    }

    /// Opens the byte stream of a tarball at its absolute URL.
    pub async fn fetch_tarball(&self, url: &str) -> Result<reqwest::Response, MirrorError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(MirrorError::DownloadFailed(format!(
                "unexpected status {} downloading tarball from {}",
                status.as_u16(),
                url
            )));
        }
        Ok(response)
    }
}

/// Decodes a registry metadata document into its published versions.
///
/// Each entry yields a [`PackageVersion`] with its release timestamp
/// looked up from the document's `time` map; a version entry the map
/// does not mention dates to the Unix epoch. A malformed version string
/// fails the whole batch. Emission order is unspecified.
pub fn decode_packages(bytes: &[u8]) -> Result<Vec<PackageVersion>, MirrorError> {
    let document: RegistryDocument = serde_json::from_slice(bytes)?;

    let mut packages = Vec::with_capacity(document.versions.len());
    for entry in document.versions.into_values() {
        let version = entry.version.parse()?;
        let release_date = document
            .time
            .get(&entry.version)
            .copied()
            .unwrap_or(DateTime::UNIX_EPOCH);

        packages.push(PackageVersion {
            name: entry.name,
            version,
            release_date,
            dependencies: entry.dependencies.into_keys().collect(),
            peer_dependencies: entry.peer_dependencies.into_keys().collect(),
            integrity: entry.dist.integrity,
            tarball_url: entry.dist.tarball,
        });
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "_id": "left-pad",
        "name": "left-pad",
        "versions": {
            "1.0.0": {
                "name": "left-pad",
                "version": "1.0.0",
                "dependencies": {"pad-core": "^1.0.0"},
                "peerDependencies": {"pad-peer": ">=2"},
                "dist": {
                    "shasum": "abc",
                    "tarball": "https://registry.example/left-pad/-/left-pad-1.0.0.tgz",
                    "integrity": "sha512-AAAA"
                }
            },
            "1.1.0-rc.1": {
                "name": "left-pad",
                "version": "1.1.0-rc.1",
                "dist": {
                    "tarball": "https://registry.example/left-pad/-/left-pad-1.1.0-rc.1.tgz",
                    "integrity": "sha512-BBBB"
                }
            }
        },
        "time": {
            "created": "2020-01-01T00:00:00.000Z",
            "1.0.0": "2020-01-02T03:04:05.000Z"
        }
    }"#;

    #[test]
    fn decodes_versions_with_dependencies() {
        let mut packages = decode_packages(DOCUMENT.as_bytes()).unwrap();
        packages.sort_by(|a, b| a.version.cmp(&b.version));
        assert_eq!(packages.len(), 2);

        let stable = &packages[0];
        assert_eq!(stable.name, "left-pad");
        assert_eq!(stable.version.to_string(), "1.0.0");
        assert_eq!(stable.dependencies, vec!["pad-core".to_string()]);
        assert_eq!(stable.peer_dependencies, vec!["pad-peer".to_string()]);
        assert_eq!(stable.integrity, "sha512-AAAA");
        assert_eq!(
            stable.tarball_url,
            "https://registry.example/left-pad/-/left-pad-1.0.0.tgz"
        );
        assert_eq!(
            stable.release_date,
            "2020-01-02T03:04:05Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn missing_dependency_blocks_are_empty() {
        let packages = decode_packages(DOCUMENT.as_bytes()).unwrap();
        let rc = packages
            .iter()
            .find(|p| p.version.is_pre_release())
            .unwrap();
        assert!(rc.dependencies.is_empty());
        assert!(rc.peer_dependencies.is_empty());
    }

    #[test]
    fn missing_time_entry_dates_to_epoch() {
        let packages = decode_packages(DOCUMENT.as_bytes()).unwrap();
        let rc = packages
            .iter()
            .find(|p| p.version.is_pre_release())
            .unwrap();
        assert_eq!(rc.release_date, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn malformed_version_fails_the_batch() {
        let doc = r#"{
            "versions": {
                "not-a-version": {
                    "name": "x", "version": "not-a-version",
                    "dist": {"tarball": "https://x/x.tgz", "integrity": "sha512-x"}
                }
            },
            "time": {}
        }"#;
        assert!(matches!(
            decode_packages(doc.as_bytes()),
            Err(MirrorError::InvalidVersion(_))
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(decode_packages(b"{not json").is_err());
    }

    #[test]
    fn empty_document_decodes_to_no_versions() {
        let packages = decode_packages(b"{}").unwrap();
        assert!(packages.is_empty());
    }
}
