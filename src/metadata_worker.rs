//! Metadata workers: fetch, persist, and decode package documents, then
//! expand the crawl frontier with the dependencies they discover.

use crate::error::MirrorError;
use crate::registry::{decode_packages, RegistryClient};
use crate::retry::RetryPolicy;
use crate::seed::SeedDescriptor;
use crate::state::{CrawlState, Lifecycle};
use crate::store::LocalStore;
use crate::types::PackageVersion;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_retry2::{Retry, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Everything one metadata worker needs: shared state, both channel
/// ends of the metadata channel (workers consume from and produce to
/// the same queue), and the producer side of the download channel.
pub(crate) struct MetadataWorkerContext {
    pub worker_id: usize,
    pub client: Arc<RegistryClient>,
    pub store: Arc<LocalStore>,
    pub state: Arc<CrawlState>,
    pub metadata_tx: mpsc::Sender<SeedDescriptor>,
    pub metadata_rx: Arc<Mutex<mpsc::Receiver<SeedDescriptor>>>,
    pub download_tx: mpsc::Sender<PackageVersion>,
    pub cancel: CancellationToken,
    pub inactivity: Duration,
    pub retry: RetryPolicy,
}

/// Runs one metadata worker until cancellation, channel closure, or the
/// inactivity window elapsing with no descriptor arriving.
pub(crate) async fn run_metadata_worker(ctx: MetadataWorkerContext) {
    debug!("[meta_#{}] Worker started", ctx.worker_id);

    loop {
        let seed = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                debug!("[meta_#{}] Received cancellation", ctx.worker_id);
                return;
            }
            received = recv_shared(&ctx.metadata_rx) => match received {
                Some(seed) => seed,
                None => {
                    debug!("[meta_#{}] Metadata channel closed", ctx.worker_id);
                    return;
                }
            },
            _ = tokio::time::sleep(ctx.inactivity) => {
                debug!("[meta_#{}] Worker stopped due to inactivity", ctx.worker_id);
                return;
            }
        };

        ctx.state.metadata_dequeued();
        if seed.name().is_empty() {
            continue;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                debug!("[meta_#{}] Received cancellation", ctx.worker_id);
                return;
            }
            result = process_seed(&ctx, &seed) => {
                if let Err(err) = result {
                    error!(
                        "[meta_#{}] Failed to retrieve metadata for {}: {}",
                        ctx.worker_id, seed, err
                    );
                }
            }
        }
    }
}

/// Receives the next descriptor from the shared metadata channel.
///
/// The mutex serializes the dequeue, not the processing: a worker holds
/// it only while waiting for one message.
async fn recv_shared<T>(rx: &Arc<Mutex<mpsc::Receiver<T>>>) -> Option<T> {
    rx.lock().await.recv().await
}

/// Analyses one crawl target: fetch + tee-persist + decode (retried as
/// a unit), filter the versions, enqueue downloads, and expand the
/// frontier with newly discovered dependencies.
async fn process_seed(
    ctx: &MetadataWorkerContext,
    seed: &SeedDescriptor,
) -> Result<(), MirrorError> {
    if !ctx.state.needs_analysis(seed) {
        debug!("Package {} already processed", seed);
        return Ok(());
    }

    debug!(
        "[meta_#{}] Fetching metadata for package: {}",
        ctx.worker_id,
        seed.name()
    );

    // The response body cannot be replayed after a partial tee-write or
    // a decode failure, so recovery restarts the whole fetch.
    let packages = Retry::spawn(ctx.retry.strategy(), || async {
        match fetch_and_persist(ctx, seed).await {
            Ok(packages) => Ok(packages),
            Err(err) => {
                warn!(
                    "[meta_#{}] Metadata attempt for {} failed: {}",
                    ctx.worker_id,
                    seed.name(),
                    err
                );
                RetryError::to_transient(err)
            }
        }
    })
    .await?;

    let selected = filter_versions(packages, seed, ctx.state.last_sync(seed));

    for package in &selected {
        debug!(
            "[meta_#{}] Enqueueing package {}:{} for download",
            ctx.worker_id, package.name, package.version
        );
        ctx.state.download_enqueued();
        if ctx.download_tx.send(package.clone()).await.is_err() {
            ctx.state.download_dequeued();
        }

        for dependency in package
            .dependencies
            .iter()
            .chain(package.peer_dependencies.iter())
        {
            if dependency.is_empty() {
                continue;
            }
            let dependent_seed = SeedDescriptor::parse(dependency);
            if ctx.state.try_start_analysis(&dependent_seed) {
                ctx.state.metadata_enqueued();
                if ctx.metadata_tx.send(dependent_seed).await.is_err() {
                    ctx.state.metadata_dequeued();
                }
            }
        }
    }

    debug!(
        "[meta_#{}] Processed package {}... {} versions to download",
        ctx.worker_id,
        seed.name(),
        selected.len()
    );
    ctx.state.set_lifecycle(seed, Lifecycle::Analysed);
    ctx.state.increment_analysed();

    Ok(())
}

/// One metadata attempt: fetch the document, stream it to disk while
/// buffering, decode the buffered bytes.
async fn fetch_and_persist(
    ctx: &MetadataWorkerContext,
    seed: &SeedDescriptor,
) -> Result<Vec<PackageVersion>, MirrorError> {
    let response = ctx.client.fetch_metadata(seed.name()).await?;
    let bytes = ctx
        .store
        .write_metadata(seed.name(), response.bytes_stream())
        .await?;
    decode_packages(&bytes)
}

/// The version filter.
///
/// A version survives when it is not a pre-release, or its pre-release
/// tag matches the seed's predicate; among survivors, only versions
/// released strictly after `last_sync` are kept (for first-time
/// packages `last_sync` is the epoch, so everything passes).
fn filter_versions(
    packages: Vec<PackageVersion>,
    seed: &SeedDescriptor,
    last_sync: DateTime<Utc>,
) -> Vec<PackageVersion> {
    packages
        .into_iter()
        .filter(|package| {
            if let Some(tag) = &package.version.pre_release {
                if !seed.matches_pre_release(tag) {
                    return false;
                }
            }
            package.release_date > last_sync
        })
        .collect()
}
