//! npmsync - Mirror an npm-compatible registry for offline installs
//!
//! This library crawls a package registry starting from a seed list,
//! discovers every transitive (dev/peer) dependency, and downloads each
//! package's metadata document and tarballs into a local directory tree
//! that a standard local registry can serve.
//!
//! # Features
//!
//! - **Recursive Discovery**: Dependencies and peer dependencies are
//!   followed until the transitive closure is exhausted
//! - **Two-Stage Pipeline**: Metadata workers and tarball workers run
//!   concurrently, connected by bounded channels
//! - **Integrity Verification**: Every tarball is SHA-512 verified
//!   against the registry's `sha512-` integrity digest while streaming
//! - **Incremental Runs**: A durable state file records what is already
//!   mirrored, so subsequent runs only fetch new versions
//! - **Pre-release Control**: Per-seed regex predicates opt specific
//!   pre-release tags into the mirror
//! - **Graceful Shutdown**: Cooperative cancellation plus per-worker
//!   inactivity timers drain the engine cleanly
//!
//! # Example
//!
//! ```no_run
//! use npmsync::{mirror_packages, MirrorConfig, MirrorOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), npmsync::MirrorError> {
//! let config = MirrorConfig::default();
//! let seeds = vec!["express".to_string()];
//! mirror_packages(&config, &seeds, MirrorOptions::default(), CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod integrity;
mod metadata_worker;
mod registry;
mod retry;
mod seed;
pub mod seeds;
mod semver;
mod state;
mod store;
mod tarball_worker;
mod types;

// Re-export public API
pub use engine::mirror_packages;
pub use error::MirrorError;
pub use integrity::integrity_of;
pub use registry::{decode_packages, RegistryClient};
pub use retry::RetryPolicy;
pub use seed::SeedDescriptor;
pub use semver::SemVer;
pub use state::{CrawlState, Lifecycle};
pub use store::LocalStore;
pub use types::{MirrorConfig, MirrorOptions, MirrorReport, PackageVersion};
