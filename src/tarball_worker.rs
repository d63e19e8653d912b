//! Tarball workers: stream each selected version's archive into the
//! local store, verifying integrity, with linear-backoff retries.

use crate::error::MirrorError;
use crate::registry::RegistryClient;
use crate::retry::RetryPolicy;
use crate::state::CrawlState;
use crate::store::LocalStore;
use crate::types::PackageVersion;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_retry2::{Retry, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Everything one tarball worker needs. The download channel is shared
/// between the workers of the pool through the mutexed receiver.
pub(crate) struct TarballWorkerContext {
    pub worker_id: usize,
    pub client: Arc<RegistryClient>,
    pub store: Arc<LocalStore>,
    pub state: Arc<CrawlState>,
    pub download_rx: Arc<Mutex<mpsc::Receiver<PackageVersion>>>,
    pub cancel: CancellationToken,
    pub inactivity: Duration,
    pub retry: RetryPolicy,
}

/// Runs one tarball worker until cancellation, channel closure, or the
/// inactivity window elapsing with no task arriving.
pub(crate) async fn run_tarball_worker(ctx: TarballWorkerContext) {
    debug!("[dl_#{}] Worker started", ctx.worker_id);

    loop {
        let package = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                debug!("[dl_#{}] Received cancellation", ctx.worker_id);
                return;
            }
            received = recv_shared(&ctx.download_rx) => match received {
                Some(package) => package,
                None => {
                    debug!("[dl_#{}] Download channel closed", ctx.worker_id);
                    return;
                }
            },
            _ = tokio::time::sleep(ctx.inactivity) => {
                debug!("[dl_#{}] Worker stopped due to inactivity", ctx.worker_id);
                return;
            }
        };

        ctx.state.download_dequeued();
        if package.name.is_empty() {
            continue;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                debug!("[dl_#{}] Received cancellation", ctx.worker_id);
                return;
            }
            result = download_tarball(&ctx, &package) => {
                if let Err(err) = result {
                    error!(
                        "[dl_#{}] Failed to download tarball for {}:{}: {}",
                        ctx.worker_id, package.name, package.version, err
                    );
                }
            }
        }
    }
}

async fn recv_shared<T>(rx: &Arc<Mutex<mpsc::Receiver<T>>>) -> Option<T> {
    rx.lock().await.recv().await
}

/// Downloads one version's tarball into the store.
///
/// Fetch and write are retried together: a half-consumed body cannot be
/// replayed, and the store discards a mismatching file, so every
/// attempt starts from a clean slate. Duplicate tasks for the same
/// version simply overwrite the same path.
async fn download_tarball(
    ctx: &TarballWorkerContext,
    package: &PackageVersion,
) -> Result<(), MirrorError> {
    let version = package.version.to_string();

    Retry::spawn(ctx.retry.strategy(), || async {
        debug!(
            "[dl_#{}] Downloading tarball for package {}:{}",
            ctx.worker_id, package.name, version
        );
        let attempt = async {
            let response = ctx.client.fetch_tarball(&package.tarball_url).await?;
            ctx.store
                .write_tarball(
                    &package.name,
                    &version,
                    &package.integrity,
                    response.bytes_stream(),
                )
                .await
        }
        .await;

        match attempt {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    "[dl_#{}] Tarball attempt for {}:{} failed: {}",
                    ctx.worker_id, package.name, version, err
                );
                RetryError::to_transient(err)
            }
        }
    })
    .await?;

    ctx.state.increment_downloaded();
    debug!(
        "[dl_#{}] Successfully downloaded tarball for package {}:{}",
        ctx.worker_id, package.name, version
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::integrity_of;
    use chrono::DateTime;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TARBALL: &[u8] = b"gzip tarball bytes";

    fn package(server_uri: &str, integrity: &str) -> PackageVersion {
        PackageVersion {
            name: "pkg".to_string(),
            version: "1.0.0".parse().unwrap(),
            release_date: DateTime::UNIX_EPOCH,
            dependencies: Vec::new(),
            peer_dependencies: Vec::new(),
            integrity: integrity.to_string(),
            tarball_url: format!("{server_uri}/pkg/-/pkg-1.0.0.tgz"),
        }
    }

    struct Harness {
        ctx: TarballWorkerContext,
        download_tx: mpsc::Sender<PackageVersion>,
        _tmp: tempfile::TempDir,
    }

    fn harness(registry_url: &str, backoff: Duration) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let (download_tx, download_rx) = mpsc::channel(64);

        let ctx = TarballWorkerContext {
            worker_id: 0,
            client: Arc::new(RegistryClient::new(registry_url)),
            store: Arc::new(LocalStore::new(
                tmp.path().join("mirror"),
                tmp.path().join("state"),
            )),
            state: Arc::new(CrawlState::new(&[], DateTime::UNIX_EPOCH)),
            download_rx: Arc::new(Mutex::new(download_rx)),
            cancel: CancellationToken::new(),
            inactivity: Duration::from_millis(100),
            retry: RetryPolicy::new(5, backoff),
        };

        Harness { ctx, download_tx, _tmp: tmp }
    }

    #[tokio::test]
    async fn worker_exits_on_cancellation() {
        let h = harness("http://127.0.0.1:9", Duration::from_millis(1));
        h.ctx.cancel.cancel();
        run_tarball_worker(h.ctx).await;
    }

    #[tokio::test]
    async fn worker_exits_when_channel_closes() {
        let h = harness("http://127.0.0.1:9", Duration::from_millis(1));
        drop(h.download_tx);
        run_tarball_worker(h.ctx).await;
    }

    #[tokio::test]
    async fn downloads_and_verifies_tarball() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg/-/pkg-1.0.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(TARBALL))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Duration::from_millis(1));
        let state = h.ctx.state.clone();
        let mirror_dir = h._tmp.path().join("mirror");

        let task = package(&server.uri(), &integrity_of(TARBALL));
        h.download_tx.send(task).await.unwrap();
        state.download_enqueued();
        drop(h.download_tx);
        run_tarball_worker(h.ctx).await;

        assert_eq!(state.downloaded_count(), 1);
        assert_eq!(state.download_queued(), 0);
        let on_disk = std::fs::read(mirror_dir.join("pkg/pkg-1.0.0.tgz")).unwrap();
        assert_eq!(on_disk, TARBALL);
    }

    #[tokio::test]
    async fn retries_through_server_errors_with_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg/-/pkg-1.0.0.tgz"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pkg/-/pkg-1.0.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(TARBALL))
            .mount(&server)
            .await;

        let backoff = Duration::from_millis(10);
        let h = harness(&server.uri(), backoff);
        let task = package(&server.uri(), &integrity_of(TARBALL));

        let started = Instant::now();
        download_tarball(&h.ctx, &task).await.unwrap();

        // Three failures wait 1×, 2×, 3× the backoff factor.
        assert!(started.elapsed() >= backoff * 6);
        assert_eq!(h.ctx.state.downloaded_count(), 1);
        assert!(h
            ._tmp
            .path()
            .join("mirror/pkg/pkg-1.0.0.tgz")
            .exists());
    }

    #[tokio::test]
    async fn persistent_integrity_mismatch_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg/-/pkg-1.0.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(TARBALL))
            .expect(5)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Duration::from_millis(1));
        let task = package(&server.uri(), "sha512-never-matches");

        let result = download_tarball(&h.ctx, &task).await;
        assert!(matches!(result, Err(MirrorError::IntegrityMismatch { .. })));
        assert_eq!(h.ctx.state.downloaded_count(), 0);
        // The corrupt file never survives an attempt.
        assert!(!h._tmp.path().join("mirror/pkg/pkg-1.0.0.tgz").exists());
    }
}
