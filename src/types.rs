//! Data structures shared across the mirroring engine.

use crate::semver::SemVer;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One published release of a package, as decoded from a registry
/// metadata document.
///
/// Produced by the metadata worker that decoded the document and
/// consumed by exactly one tarball worker via the download channel.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    /// Package name (scoped names keep their `@scope/` prefix).
    pub name: String,
    /// Parsed semantic version.
    pub version: SemVer,
    /// Publication timestamp from the document's `time` map; the Unix
    /// epoch when the document carries no entry for this version.
    pub release_date: DateTime<Utc>,
    /// Names of the version's declared dependencies.
    pub dependencies: Vec<String>,
    /// Names of the version's declared peer dependencies.
    pub peer_dependencies: Vec<String>,
    /// Integrity digest declared by the registry (`sha512-<base64>`).
    pub integrity: String,
    /// Absolute URL of the version's tarball.
    pub tarball_url: String,
}

/// Configuration for a mirror run.
///
/// # Example
///
/// ```
/// use npmsync::MirrorConfig;
///
/// let config = MirrorConfig {
///     registry_url: "https://registry.npmjs.org".to_string(),
///     base_dir: "./mirror".to_string(),
///     state_file: "./mirror_state".to_string(),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Base URL of the upstream registry (e.g. `<https://registry.npmjs.org>`).
    pub registry_url: String,
    /// Root directory of the local mirror layout.
    pub base_dir: String,
    /// Path of the durable crawl state file.
    pub state_file: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            registry_url: "https://registry.npmjs.org".to_string(),
            base_dir: ".".to_string(),
            state_file: "./mirror_state".to_string(),
        }
    }
}

/// Worker-pool options for a mirror run.
///
/// Workers are I/O-bound; the download pool in particular is limited by
/// network bandwidth rather than CPU, hence the large default.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Number of parallel metadata workers (default: 5).
    pub metadata_workers: usize,
    /// Number of parallel tarball download workers (default: 100).
    pub download_workers: usize,
    /// When enabled, descriptors from the persisted state file are
    /// appended to the seeds so already-known packages are re-evaluated
    /// against the new last-sync timestamp.
    pub refresh_known: bool,
    /// Idle period after which a worker voluntarily exits; the engine
    /// terminates once the whole frontier has drained for this long
    /// (default: 10 s).
    pub inactivity_window: Duration,
    /// Attempts per metadata/tarball operation, including the first
    /// (default: 5).
    pub retry_attempts: usize,
    /// Linear backoff factor between attempts: re-attempt `n` waits
    /// `n × backoff_factor` (default: 1 s).
    pub backoff_factor: Duration,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            metadata_workers: 5,
            download_workers: 100,
            refresh_known: true,
            inactivity_window: Duration::from_secs(10),
            retry_attempts: 5,
            backoff_factor: Duration::from_secs(1),
        }
    }
}

/// Final counters of a mirror run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorReport {
    /// Packages whose metadata was analysed this run.
    pub analysed: usize,
    /// Tarballs downloaded and verified this run.
    pub downloaded: usize,
}
