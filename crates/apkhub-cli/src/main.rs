//! apkhub - client for decentralized Android package buckets

use apkhub_repo::{ClientConfig, Engine};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;
mod util;

use error::Result;

#[derive(Parser)]
#[command(name = "apkhub")]
#[command(author = "apkhub Contributors")]
#[command(version)]
#[command(about = "Search and download Android packages from decentralized buckets", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "APKHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage buckets
    Bucket {
        #[command(subcommand)]
        command: BucketCommands,
    },

    /// Refresh every enabled bucket
    Update,

    /// Search packages across enabled buckets
    Search {
        /// Search query (empty lists everything)
        #[arg(default_value = "")]
        query: String,

        /// Only packages in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Only packages with a build installable at this SDK level
        #[arg(long = "sdk")]
        device_sdk: Option<u32>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Search cached manifests only, without touching the network
        #[arg(long)]
        offline: bool,
    },

    /// Show package details
    Info {
        /// Package id
        package: String,
    },

    /// Download and verify a package
    Download {
        /// Package id
        package: String,

        /// Version key or display version (default: latest)
        #[arg(id = "package_version", value_name = "VERSION")]
        version: Option<String>,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Download even if a verified copy exists
        #[arg(long)]
        force: bool,
    },

    /// Probe every bucket and report its health
    Health,

    /// Manage the manifest cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum BucketCommands {
    /// Add a bucket
    Add {
        /// Bucket name
        name: String,

        /// Base URL (http, https or file)
        url: String,
    },

    /// Remove a bucket and its cached manifest
    Remove {
        /// Bucket name
        name: String,
    },

    /// List configured buckets
    List,

    /// Enable a bucket
    Enable {
        /// Bucket name
        name: String,
    },

    /// Disable a bucket
    Disable {
        /// Bucket name
        name: String,
    },

    /// Refresh one bucket, or all enabled buckets
    Update {
        /// Bucket name
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache statistics
    Stats,

    /// Remove expired entries
    Clean,

    /// Remove every entry
    Clear,
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    if let Err(err) = run(cli, &cancel).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Logs go to stderr so `--json` output stays parseable. `RUST_LOG`
/// overrides the level chosen here.
fn init_tracing(debug: bool) {
    let default = if debug { "apkhub=debug,apkhub_repo=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

fn open_engine(config: Option<PathBuf>) -> Result<Engine> {
    let path = match config {
        Some(path) => path,
        None => ClientConfig::default_path()?,
    };
    tracing::debug!(path = %path.display(), "loading configuration");
    Ok(Engine::open(path)?)
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let engine = open_engine(cli.config)?;
    let json = cli.json;

    match cli.command {
        Commands::Bucket { command } => match command {
            BucketCommands::Add { name, url } => commands::bucket::add(&engine, &name, &url, json),
            BucketCommands::Remove { name } => commands::bucket::remove(&engine, &name, json),
            BucketCommands::List => commands::bucket::list(&engine, json),
            BucketCommands::Enable { name } => {
                commands::bucket::set_enabled(&engine, &name, true, json)
            }
            BucketCommands::Disable { name } => {
                commands::bucket::set_enabled(&engine, &name, false, json)
            }
            BucketCommands::Update { name } => {
                commands::bucket::update(&engine, name.as_deref(), json, cancel).await
            }
        },

        Commands::Update => commands::bucket::update(&engine, None, json, cancel).await,

        Commands::Search {
            query,
            category,
            device_sdk,
            limit,
            offline,
        } => {
            let options = apkhub_repo::SearchOptions {
                category,
                device_sdk,
                limit,
            };
            commands::search::run(&engine, &query, &options, offline, json, cancel).await
        }

        Commands::Info { package } => commands::info::run(&engine, &package, json, cancel).await,

        Commands::Download {
            package,
            version,
            output,
            force,
        } => {
            let options = apkhub_repo::DownloadOptions { force, output };
            commands::download::run(&engine, &package, version.as_deref(), &options, json, cancel)
                .await
        }

        Commands::Health => commands::health::run(&engine, json, cancel).await,

        Commands::Cache { command } => match command {
            CacheCommands::Stats => commands::cache::stats(&engine, json),
            CacheCommands::Clean => commands::cache::clean(&engine, json),
            CacheCommands::Clear => commands::cache::clear(&engine, json),
        },
    }
}
