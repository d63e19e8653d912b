//! Shared crawl state: which packages are known, being analysed, or done.

use crate::seed::SeedDescriptor;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Lifecycle of a crawl target, keyed by its fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Loaded from the state file of a previous run; not yet re-examined.
    KnownFromPreviousRun,
    /// Enqueued for metadata analysis during this run.
    Analysing,
    /// Metadata fetched, persisted, and fanned out.
    Analysed,
}

/// Thread-safe crawl state shared by every worker.
///
/// The fingerprint map is the sole authority on deduplication: a
/// descriptor is analysed at most once per run, no matter how many
/// dependency edges point at it. Counters are atomics so the progress
/// ticker never contends with the workers.
#[derive(Debug)]
pub struct CrawlState {
    lifecycles: RwLock<HashMap<String, Lifecycle>>,
    last_sync: DateTime<Utc>,

    analysed_count: AtomicUsize,
    downloaded_count: AtomicUsize,

    // Channel depth gauges for the progress ticker; incremented on
    // enqueue and decremented on dequeue by whoever touches a channel.
    metadata_queued: AtomicUsize,
    download_queued: AtomicUsize,
}

impl CrawlState {
    /// Builds the state for one run from the descriptors loaded out of
    /// the previous run's state file and its last-sync timestamp.
    pub fn new(known: &[SeedDescriptor], last_sync: DateTime<Utc>) -> Self {
        let lifecycles = known
            .iter()
            .map(|d| (d.fingerprint().to_string(), Lifecycle::KnownFromPreviousRun))
            .collect();

        CrawlState {
            lifecycles: RwLock::new(lifecycles),
            last_sync,
            analysed_count: AtomicUsize::new(0),
            downloaded_count: AtomicUsize::new(0),
            metadata_queued: AtomicUsize::new(0),
            download_queued: AtomicUsize::new(0),
        }
    }

    /// True unless the descriptor has already been fully analysed.
    pub fn needs_analysis(&self, descriptor: &SeedDescriptor) -> bool {
        let lifecycles = self.lifecycles.read().unwrap();
        lifecycles.get(descriptor.fingerprint()) != Some(&Lifecycle::Analysed)
    }

    /// True iff the descriptor has been enqueued during this run, i.e.
    /// it is present and past `KnownFromPreviousRun`.
    pub fn analysis_started(&self, descriptor: &SeedDescriptor) -> bool {
        let lifecycles = self.lifecycles.read().unwrap();
        matches!(
            lifecycles.get(descriptor.fingerprint()),
            Some(Lifecycle::Analysing) | Some(Lifecycle::Analysed)
        )
    }

    /// Atomically marks the descriptor `Analysing` if its analysis has
    /// not started this run. Returns true when the caller won the race
    /// and should enqueue the descriptor.
    pub fn try_start_analysis(&self, descriptor: &SeedDescriptor) -> bool {
        let mut lifecycles = self.lifecycles.write().unwrap();
        match lifecycles.get(descriptor.fingerprint()) {
            Some(Lifecycle::Analysing) | Some(Lifecycle::Analysed) => false,
            _ => {
                lifecycles.insert(descriptor.fingerprint().to_string(), Lifecycle::Analysing);
                true
            }
        }
    }

    /// Sets the descriptor's lifecycle unconditionally.
    pub fn set_lifecycle(&self, descriptor: &SeedDescriptor, lifecycle: Lifecycle) {
        let mut lifecycles = self.lifecycles.write().unwrap();
        lifecycles.insert(descriptor.fingerprint().to_string(), lifecycle);
    }

    /// The last-synchronization timestamp to filter the descriptor's
    /// versions against: the global timestamp when the fingerprint is
    /// known, the epoch otherwise (a first-time package accepts every
    /// version).
    pub fn last_sync(&self, descriptor: &SeedDescriptor) -> DateTime<Utc> {
        let lifecycles = self.lifecycles.read().unwrap();
        if lifecycles.contains_key(descriptor.fingerprint()) {
            self.last_sync
        } else {
            DateTime::UNIX_EPOCH
        }
    }

    /// Every descriptor currently known to the crawl, reconstructed from
    /// the stored fingerprints (predicates survive).
    pub fn all_descriptors(&self) -> Vec<SeedDescriptor> {
        let lifecycles = self.lifecycles.read().unwrap();
        lifecycles
            .keys()
            .map(|fingerprint| SeedDescriptor::parse(fingerprint))
            .collect()
    }

    pub fn increment_analysed(&self) {
        self.analysed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn analysed_count(&self) -> usize {
        self.analysed_count.load(Ordering::Relaxed)
    }

    pub fn increment_downloaded(&self) {
        self.downloaded_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn downloaded_count(&self) -> usize {
        self.downloaded_count.load(Ordering::Relaxed)
    }

    pub fn metadata_enqueued(&self) {
        self.metadata_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metadata_dequeued(&self) {
        self.metadata_queued.fetch_sub(1, Ordering::Relaxed);
    }

    /// Descriptors sitting in the metadata channel.
    pub fn metadata_queued(&self) -> usize {
        self.metadata_queued.load(Ordering::Relaxed)
    }

    pub fn download_enqueued(&self) {
        self.download_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn download_dequeued(&self) {
        self.download_queued.fetch_sub(1, Ordering::Relaxed);
    }

    /// Versions sitting in the download channel.
    pub fn download_queued(&self) -> usize {
        self.download_queued.load(Ordering::Relaxed)
    }
}
