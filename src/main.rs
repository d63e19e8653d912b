use clap::Parser;
use npmsync::{mirror_packages, seeds, MirrorConfig, MirrorOptions};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "npmsync")]
#[command(about = "Mirror npm packages and their dependencies into a local directory", long_about = None)]
#[command(version)]
struct Args {
    /// Packages to mirror, as `name` or `name|pre-release-pattern`
    packages: Vec<String>,

    /// File listing packages to mirror (one per line, # comments ignored)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// package.json whose dependency blocks seed the mirror
    #[arg(short = 'p', long = "package-json")]
    package_json: Option<PathBuf>,

    /// Destination directory for the mirrored packages
    #[arg(short, long, default_value = ".")]
    dest: String,

    /// Path of the file storing the state of already-mirrored packages
    #[arg(short, long, default_value = "./mirror_state")]
    state_file: String,

    /// Upstream registry base URL
    #[arg(long, default_value = "https://registry.npmjs.org")]
    registry: String,

    /// Number of parallel workers fetching metadata
    #[arg(long, default_value_t = 5)]
    metadata_workers: usize,

    /// Number of parallel workers downloading tarballs
    #[arg(long, default_value_t = 100)]
    download_workers: usize,

    /// Re-evaluate packages already present in the state file
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    refresh_known: bool,

    /// Worker inactivity window in seconds (engine drains once idle)
    #[arg(long, default_value_t = 10)]
    inactivity_secs: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("npmsync={}", log_level))
        .init();

    // Aggregate seeds from CLI args, the seed file, and the manifest.
    let mut seed_list = args.packages.clone();
    if let Some(path) = &args.file {
        seed_list.extend(seeds::read_seed_file(path)?);
    }
    if let Some(path) = &args.package_json {
        seed_list.extend(seeds::read_manifest(path)?);
    }

    if seed_list.is_empty() {
        eprintln!("Error: no packages were specified to mirror");
        std::process::exit(1);
    }

    info!("npmsync - npm registry mirror");
    info!("Registry: {}", args.registry);
    info!("Destination: {}", args.dest);
    info!("State file: {}", args.state_file);
    info!("Seeds: {}", seed_list.len());

    let config = MirrorConfig {
        registry_url: args.registry,
        base_dir: args.dest.clone(),
        state_file: args.state_file.clone(),
    };
    let options = MirrorOptions {
        metadata_workers: args.metadata_workers,
        download_workers: args.download_workers,
        refresh_known: args.refresh_known,
        inactivity_window: Duration::from_secs(args.inactivity_secs),
        ..MirrorOptions::default()
    };

    // Ctrl-C cancels the crawl; workers drain and the state file is
    // still written.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, draining workers");
            signal_cancel.cancel();
        }
    });

    match mirror_packages(&config, &seed_list, options, cancel).await {
        Ok(report) => {
            info!("Mirror summary:");
            info!("  - Destination folder: {}", args.dest);
            info!("  - State file: {}", args.state_file);
            info!("  - Packages analysed: {}", report.analysed);
            info!("  - Tarballs downloaded: {}", report.downloaded);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
