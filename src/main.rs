//! quote-tree main entry point
//!
//! This is the command-line interface for the quote-tree crawler.

use anyhow::Context;
use clap::{Parser, Subcommand};
use quote_tree::api::BskyClient;
use quote_tree::config::{load_config_with_hash, Config, Credentials};
use quote_tree::crawler::{
    Coordinator, CrawlReport, Interrupt, StopReason, TraceOutcome, UpdateReport,
};
use quote_tree::output::{load_statistics, print_statistics};
use quote_tree::storage::{open_storage, open_storage_read_only};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code for a run stopped by the user
const EXIT_INTERRUPTED: u8 = 130;

/// quote-tree: maps the quote-post tree of a single post
///
/// Walks every post that quotes the root, transitively, and keeps the
/// resulting tree in a SQLite database that can be resumed and refreshed.
#[derive(Parser, Debug)]
#[command(name = "quote-tree")]
#[command(version)]
#[command(about = "Maps the quote-post tree of a post", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the configuration
    #[arg(long, value_name = "PATH", global = true)]
    database: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk from a post up to the root of its tree and print the chain
    Trace {
        /// Post URL or AT URI
        post: String,
    },

    /// Crawl every quote of a post, transitively
    Crawl {
        /// Post URL or AT URI
        post: String,

        /// Maximum depth below the post, overriding the configuration
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Crawl every pending post in the database (resumes interrupted runs)
    CrawlAll,

    /// Re-check crawled posts for new quotes
    Update {
        /// Only re-check posts last crawled at least this many minutes ago
        #[arg(long)]
        min_age_minutes: Option<u64>,
    },

    /// Show statistics from the database and exit
    Stats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env file is fine; the variables may already be set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    let (mut config, config_hash) = load_config_with_hash(cli.config.as_deref())
        .context("Failed to load configuration")?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    if let Some(database) = &cli.database {
        config.output.database_path = database.display().to_string();
    }

    match cli.command {
        Command::Stats => handle_stats(&config),
        Command::Trace { post } => {
            let mut coordinator = connect(config, config_hash).await?;
            handle_trace(&mut coordinator, &post).await
        }
        Command::Crawl { post, max_depth } => {
            if max_depth.is_some() {
                config.crawler.max_depth = max_depth;
            }
            let mut coordinator = connect(config, config_hash).await?;
            let report = coordinator.crawl(&post).await?;
            Ok(print_crawl_report(&report))
        }
        Command::CrawlAll => {
            let mut coordinator = connect(config, config_hash).await?;
            let report = coordinator.crawl_all().await?;
            Ok(print_crawl_report(&report))
        }
        Command::Update { min_age_minutes } => {
            if let Some(minutes) = min_age_minutes {
                config.update.min_age_minutes = minutes;
            }
            let mut coordinator = connect(config, config_hash).await?;
            let report = coordinator.update().await?;
            Ok(print_update_report(&report))
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("quote_tree=info,warn"),
            1 => EnvFilter::new("quote_tree=debug,info"),
            2 => EnvFilter::new("quote_tree=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Opens the store and an authenticated session, and wires up Ctrl-C
///
/// Credentials are checked before any network call is made.
async fn connect(config: Config, config_hash: String) -> anyhow::Result<Coordinator<BskyClient>> {
    let credentials = Credentials::from_env()?;

    let storage = open_storage(Path::new(&config.output.database_path)).with_context(|| {
        format!("Failed to open database {}", config.output.database_path)
    })?;

    let client = BskyClient::login(&config.api, &config.user_agent, &credentials).await?;

    let interrupt = Interrupt::new();
    let handle = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next page boundary");
            handle.trigger();
        }
    });

    Ok(Coordinator::new(client, storage, config, config_hash).with_interrupt(interrupt))
}

/// Handles `stats`: read-only, needs no credentials
fn handle_stats(config: &Config) -> anyhow::Result<ExitCode> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage_read_only(Path::new(&config.output.database_path))
        .with_context(|| format!("Cannot read database {}", config.output.database_path))?;
    let stats = load_statistics(&storage, config.crawler.max_failed_attempts)?;
    print_statistics(&stats);

    Ok(ExitCode::SUCCESS)
}

async fn handle_trace(
    coordinator: &mut Coordinator<BskyClient>,
    post: &str,
) -> anyhow::Result<ExitCode> {
    let report = coordinator.trace(post).await?;

    println!("Chain length: {}", report.chain.len());
    for (i, uri) in report.chain.iter().enumerate() {
        println!("  {:>3}: {}", i, uri);
    }

    match &report.outcome {
        TraceOutcome::ReachedRoot => {
            println!("Root: {}", report.root().unwrap_or("none"));
            Ok(ExitCode::SUCCESS)
        }
        TraceOutcome::Gap { uri, reason } => {
            println!("Root not reached: could not resolve {} ({})", uri, reason);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn stop_exit_code(stop_reason: Option<StopReason>) -> ExitCode {
    match stop_reason {
        Some(StopReason::Interrupted) => {
            println!("Interrupted; run `crawl-all` to resume.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Some(StopReason::TimeLimit) => {
            println!("Time limit reached; run `crawl-all` to continue.");
            ExitCode::SUCCESS
        }
        None => ExitCode::SUCCESS,
    }
}

fn print_crawl_report(report: &CrawlReport) -> ExitCode {
    println!("Nodes crawled: {}", report.nodes_crawled);
    println!("New posts: {}", report.posts_discovered);
    println!("Pages fetched: {}", report.pages_fetched);
    println!("Failed: {}", report.nodes_failed);
    if report.ancestors_fetched > 0 {
        println!("Ancestors fetched: {}", report.ancestors_fetched);
    }
    if report.nodes_deferred > 0 {
        println!("Deferred: {}", report.nodes_deferred);
    }
    if !report.permanently_failed.is_empty() {
        println!("Permanently failed ({}):", report.permanently_failed.len());
        for uri in &report.permanently_failed {
            println!("  - {}", uri);
        }
    }
    stop_exit_code(report.stop_reason)
}

fn print_update_report(report: &UpdateReport) -> ExitCode {
    println!("Posts checked: {}", report.checked);
    println!("Unchanged: {}", report.unchanged);
    println!("Re-listed: {}", report.recrawled);
    println!("Vanished: {}", report.vanished);
    println!("Failed: {}", report.failed);
    println!("New quotes found: {}", report.new_posts);
    println!("Missing parents fetched: {}", report.ancestors_fetched);
    if report.unresolved_parents > 0 {
        println!("Unresolved parents: {}", report.unresolved_parents);
    }
    println!();
    println!("Follow-up crawl:");
    print_crawl_report(&report.drain)
}
