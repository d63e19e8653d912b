//! Engine controller: wires the channels, spawns the worker pools,
//! feeds the seeds, waits for quiescence, and persists the crawl state.

use crate::error::MirrorError;
use crate::metadata_worker::{run_metadata_worker, MetadataWorkerContext};
use crate::registry::RegistryClient;
use crate::retry::RetryPolicy;
use crate::seed::SeedDescriptor;
use crate::state::CrawlState;
use crate::store::LocalStore;
use crate::tarball_worker::{run_tarball_worker, TarballWorkerContext};
use crate::types::{MirrorConfig, MirrorOptions, MirrorReport, PackageVersion};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Capacity of the metadata and download channels. Large enough that a
/// metadata worker fanning out a big dependency tree practically never
/// blocks on the same channel it consumes from.
const CHANNEL_BUFFER_SIZE: usize = 100_000;

/// Mirrors the transitive closure of `seeds` from the configured
/// registry into the local store.
///
/// This is the main entry point. It performs the following steps:
///
/// 1. Loads the persisted crawl state (previously mirrored packages and
///    the last-sync timestamp)
/// 2. Spawns the metadata and tarball worker pools, connected by
///    bounded channels
/// 3. Feeds the seeds (plus, with `refresh_known`, every package from
///    the state file) into the metadata channel
/// 4. Waits for both pools to drain and exit
/// 5. Persists the new crawl state with this run's start timestamp
///
/// Cancelling `cancel` aborts all workers at their next awaitable point;
/// the state file is still written so the next run can resume.
///
/// # Example
///
/// ```no_run
/// use npmsync::{mirror_packages, MirrorConfig, MirrorOptions};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), npmsync::MirrorError> {
/// let config = MirrorConfig::default();
/// let seeds = vec!["express".to_string(), "lodash".to_string()];
/// let report = mirror_packages(
///     &config,
///     &seeds,
///     MirrorOptions::default(),
///     CancellationToken::new(),
/// )
/// .await?;
/// println!("analysed {}, downloaded {}", report.analysed, report.downloaded);
/// # Ok(())
/// # }
/// ```
pub async fn mirror_packages(
    config: &MirrorConfig,
    seeds: &[String],
    options: MirrorOptions,
    cancel: CancellationToken,
) -> Result<MirrorReport, MirrorError> {
    let client = Arc::new(RegistryClient::new(config.registry_url.clone()));
    let store = Arc::new(LocalStore::new(&config.base_dir, &config.state_file));

    // A corrupt state file is fatal: without it the engine cannot know
    // what is already mirrored.
    let (known, last_sync) = store.load_state().await?;
    let state = Arc::new(CrawlState::new(&known, last_sync));

    // This becomes the next `Last sync` header.
    let run_started = Utc::now();
    let retry = RetryPolicy::new(options.retry_attempts, options.backoff_factor);

    info!("Starting mirror run");

    let (metadata_tx, metadata_rx) = mpsc::channel::<SeedDescriptor>(CHANNEL_BUFFER_SIZE);
    let (download_tx, download_rx) = mpsc::channel::<PackageVersion>(CHANNEL_BUFFER_SIZE);
    let metadata_rx = Arc::new(Mutex::new(metadata_rx));
    let download_rx = Arc::new(Mutex::new(download_rx));

    let ticker = tokio::spawn(progress_ticker(state.clone(), cancel.clone()));

    let mut seed_list: Vec<SeedDescriptor> =
        seeds.iter().map(|s| SeedDescriptor::parse(s)).collect();
    if options.refresh_known {
        info!(
            "Refreshing local repository: adding {} package(s) from the state file",
            known.len()
        );
        seed_list.extend(known);
    }

    let mut metadata_handles = Vec::with_capacity(options.metadata_workers);
    for worker_id in 0..options.metadata_workers {
        metadata_handles.push(tokio::spawn(run_metadata_worker(MetadataWorkerContext {
            worker_id,
            client: client.clone(),
            store: store.clone(),
            state: state.clone(),
            metadata_tx: metadata_tx.clone(),
            metadata_rx: metadata_rx.clone(),
            download_tx: download_tx.clone(),
            cancel: cancel.clone(),
            inactivity: options.inactivity_window,
            retry,
        })));
    }

    let mut tarball_handles = Vec::with_capacity(options.download_workers);
    for worker_id in 0..options.download_workers {
        tarball_handles.push(tokio::spawn(run_tarball_worker(TarballWorkerContext {
            worker_id,
            client: client.clone(),
            store: store.clone(),
            state: state.clone(),
            download_rx: download_rx.clone(),
            cancel: cancel.clone(),
            inactivity: options.inactivity_window,
            retry,
        })));
    }

    for seed in seed_list {
        state.metadata_enqueued();
        if metadata_tx.send(seed).await.is_err() {
            state.metadata_dequeued();
        }
    }

    // Only the workers hold channel ends from here on: once the
    // metadata pool exits, the last metadata and download senders drop,
    // which closes both channels behind the remaining consumers.
    drop(metadata_tx);
    drop(download_tx);

    for handle in metadata_handles {
        let _ = handle.await;
    }
    info!("Metadata workers finished");

    for handle in tarball_handles {
        let _ = handle.await;
    }
    info!("Download workers finished");

    ticker.abort();

    store.save_state(&state.all_descriptors(), run_started).await?;

    let report = MirrorReport {
        analysed: state.analysed_count(),
        downloaded: state.downloaded_count(),
    };
    info!(
        "Mirror run finished: analysed {}, downloaded {}",
        report.analysed, report.downloaded
    );
    Ok(report)
}

/// Logs crawl progress once per second until cancelled or aborted.
async fn progress_ticker(state: Arc<CrawlState>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    // The first tick completes immediately; skip it so the first line
    // appears after one second of work.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let analysed = state.analysed_count();
                let downloaded = state.downloaded_count();
                info!(
                    "Analysed: {}/{}, Downloaded: {}/{}",
                    analysed,
                    analysed + state.metadata_queued(),
                    downloaded,
                    downloaded + state.download_queued()
                );
            }
        }
    }
}
