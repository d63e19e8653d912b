//! Local mirror layout: metadata documents, tarballs, and the crawl
//! state file.

use crate::error::MirrorError;
use crate::integrity::IntegrityHasher;
use crate::seed::SeedDescriptor;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{pin_mut, Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// Prefix of the state file's mandatory first line.
const LAST_SYNC_PREFIX: &str = "Last sync: ";

/// Writes package metadata and tarballs to a deterministic directory
/// layout and persists the crawl state file.
///
/// For a package `P` the directory is `<base>/<P>`; slashes in scoped
/// names (`@scope/name`) become nested directories. The metadata file is
/// `<pkgdir>/package.json` and each tarball is
/// `<pkgdir>/<basename(P)>-<version>.tgz`, so concurrent writers for
/// different versions of the same package never collide.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_dir: PathBuf,
    state_file: PathBuf,
}

impl LocalStore {
    /// Creates a store rooted at `base_dir`, with the crawl state file
    /// at `state_file`.
    pub fn new(base_dir: impl Into<PathBuf>, state_file: impl Into<PathBuf>) -> Self {
        LocalStore {
            base_dir: base_dir.into(),
            state_file: state_file.into(),
        }
    }

    /// Directory holding a package's metadata and tarballs.
    fn package_dir(&self, name: &str) -> PathBuf {
        let mut dir = self.base_dir.clone();
        for part in name.split('/') {
            dir.push(part);
        }
        dir
    }

    /// Streams a metadata document into `<pkgdir>/package.json` while
    /// accumulating the same bytes for the decoder.
    ///
    /// This is the single-pass tee: the returned buffer is exactly what
    /// was persisted, so the caller can decode without re-reading the
    /// file or the network.
    pub async fn write_metadata<S, E>(
        &self,
        name: &str,
        stream: S,
    ) -> Result<Vec<u8>, MirrorError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<MirrorError>,
    {
        let dir = self.package_dir(name);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join("package.json");
        let mut file = BufWriter::new(tokio::fs::File::create(&path).await?);
        pin_mut!(stream);

        let mut buffer = Vec::new();
        while let Some(piece) = stream.next().await {
            let chunk = match piece {
                Ok(chunk) => chunk,
                Err(err) => return Err(err.into()),
            };
            file.write_all(&chunk).await?;
            buffer.extend_from_slice(&chunk);
        }
        file.flush().await?;

        debug!("Wrote metadata for {} to {}", name, path.display());
        Ok(buffer)
    }

    /// Streams a tarball into `<pkgdir>/<basename>-<version>.tgz`,
    /// hashing it on the way, and verifies the SHA-512 digest against
    /// the integrity string declared by the registry.
    ///
    /// On a digest mismatch the partially written file is removed before
    /// the error is returned, so the mirror never presents a corrupt
    /// tarball to downstream consumers.
    pub async fn write_tarball<S, E>(
        &self,
        name: &str,
        version: &str,
        expected_integrity: &str,
        stream: S,
    ) -> Result<(), MirrorError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<MirrorError>,
    {
        let dir = self.package_dir(name);
        tokio::fs::create_dir_all(&dir).await?;

        // basename handles scoped packages: @scope/name -> name-<v>.tgz
        let basename = name.rsplit('/').next().unwrap_or(name);
        let path = dir.join(format!("{}-{}.tgz", basename, version));
        let mut file = BufWriter::new(tokio::fs::File::create(&path).await?);
        pin_mut!(stream);

        let mut hasher = IntegrityHasher::new();
        while let Some(piece) = stream.next().await {
            let chunk = match piece {
                Ok(chunk) => chunk,
                Err(err) => return Err(err.into()),
            };
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        let computed = hasher.finalize();
        if computed != expected_integrity {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(MirrorError::IntegrityMismatch {
                expected: expected_integrity.to_string(),
                computed,
            });
        }

        debug!("Wrote tarball {}", path.display());
        Ok(())
    }

    /// Loads the crawl state file.
    ///
    /// An absent file is an empty state (no descriptors, epoch
    /// timestamp). Otherwise the first line must carry the
    /// `Last sync: <RFC3339>` header; each subsequent non-empty line is
    /// parsed through the seed-descriptor constructor so pre-release
    /// predicates survive the round trip.
    pub async fn load_state(
        &self,
    ) -> Result<(Vec<SeedDescriptor>, DateTime<Utc>), MirrorError> {
        let content = match tokio::fs::read_to_string(&self.state_file).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok((Vec::new(), DateTime::UNIX_EPOCH));
            }
            Err(err) => return Err(err.into()),
        };

        let mut lines = content.lines();
        let last_sync = match lines.next() {
            None => DateTime::UNIX_EPOCH,
            Some(first) => {
                let date_str = first.strip_prefix(LAST_SYNC_PREFIX).ok_or_else(|| {
                    MirrorError::InvalidStateFile(format!(
                        "{}: missing '{}' header",
                        self.state_file.display(),
                        LAST_SYNC_PREFIX.trim_end()
                    ))
                })?;
                DateTime::parse_from_rfc3339(date_str.trim())
                    .map_err(|err| {
                        MirrorError::InvalidStateFile(format!(
                            "{}: bad sync date: {}",
                            self.state_file.display(),
                            err
                        ))
                    })?
                    .with_timezone(&Utc)
            }
        };

        let descriptors = lines
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(SeedDescriptor::parse)
            .collect();

        Ok((descriptors, last_sync))
    }

    /// Persists the crawl state file: the `Last sync:` header followed
    /// by one fingerprint per line.
    ///
    /// The content is written to a sibling temp file and renamed into
    /// place, so a crash leaves either the old or the new file.
    pub async fn save_state(
        &self,
        descriptors: &[SeedDescriptor],
        last_sync: DateTime<Utc>,
    ) -> Result<(), MirrorError> {
        if let Some(parent) = self.state_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut content = format!(
            "{}{}\n",
            LAST_SYNC_PREFIX,
            last_sync.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        for descriptor in descriptors {
            content.push_str(descriptor.fingerprint());
            content.push('\n');
        }

        let tmp_path = temp_sibling(&self.state_file);
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.state_file).await?;

        debug!(
            "Saved state for {} package(s) to {}",
            descriptors.len(),
            self.state_file.display()
        );
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
