//! Error types for mirroring operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while mirroring a registry.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP request error while talking to the registry.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// General download failure (unexpected status, exhausted retries, ...).
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// A tarball's SHA-512 digest did not match the integrity string
    /// declared by the registry metadata.
    #[error("integrity mismatch: expected {expected}, computed {computed}")]
    IntegrityMismatch {
        /// Integrity string declared by the registry (`sha512-<base64>`).
        expected: String,
        /// Integrity string computed from the downloaded bytes.
        computed: String,
    },

    /// A version string in a metadata document could not be parsed.
    #[error("invalid version format: {0}")]
    InvalidVersion(String),

    /// The persisted crawl state file is corrupt. This is fatal to the
    /// run: the engine cannot know what is already mirrored, so the
    /// operator must repair or delete the file.
    #[error("invalid state file: {0}")]
    InvalidStateFile(String),
}
