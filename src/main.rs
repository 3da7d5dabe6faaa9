//! # Blog Sync CLI (`blogsync`)
//!
//! Synchronizes a Feishu knowledge base into the blog's SQLite database.
//!
//! ## Usage
//!
//! ```bash
//! blogsync --config ./config/blogsync.toml [command]
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `blogsync` / `blogsync sync` | Export, reconcile, and apply |
//! | `blogsync export` | Run only the exporter into staging |
//! | `blogsync init` | Create the database schema |
//! | `blogsync get <slug>` | Show one synchronized post |
//! | `blogsync stats` | Posts per type and tag counts |
//! | `blogsync clear --yes` | Delete all posts and tags |
//!
//! ## Exit codes
//!
//! `0` success, `1` fatal error, `2` the sync finished but some records
//! were skipped or failed.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use blog_sync::progress::ProgressMode;
use blog_sync::sync::SyncOptions;
use blog_sync::{clear, config, get, migrate, stats, sync};

/// Blog Sync CLI: mirror a Feishu knowledge base into the blog database.
///
/// Credentials come from `FEISHU_APP_ID`, `FEISHU_APP_SECRET`, and
/// `FEISHU_SPACE_ID` (a `.env` file in the working directory is loaded).
#[derive(Parser)]
#[command(
    name = "blogsync",
    about = "Sync a Feishu knowledge base into the blog's SQLite database",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/blogsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline (the default when no command is given).
    Sync {
        /// Reconcile the current staging directory without running the exporter.
        #[arg(long)]
        skip_export: bool,

        /// Show the plan without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Do not take the single-flight lock.
        #[arg(long)]
        no_lock: bool,

        /// Progress on stderr: off, human, or json. Defaults to human on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Run the exporter and refresh the staging directory only.
    Export {
        /// Do not take the single-flight lock.
        #[arg(long)]
        no_lock: bool,
    },

    /// Initialize the database schema. Idempotent.
    Init,

    /// Show a synchronized post by slug.
    Get {
        slug: String,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print database statistics.
    Stats,

    /// Delete every post and tag, native posts included.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = config::load_config(&cli.config)?;

    let command = cli.command.unwrap_or(Commands::Sync {
        skip_export: false,
        dry_run: false,
        no_lock: false,
        progress: None,
    });

    match command {
        Commands::Sync {
            skip_export,
            dry_run,
            no_lock,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let options = SyncOptions {
                skip_export,
                dry_run,
                no_lock,
            };
            let reporter = mode.reporter();
            if let Some(report) = sync::run_sync(&cfg, options, reporter.as_ref()).await? {
                report.print_summary(&cfg.sync.post_type);
                if !report.is_clean() {
                    return Ok(ExitCode::from(2));
                }
            }
        }
        Commands::Export { no_lock } => {
            sync::run_export_only(&cfg, no_lock).await?;
        }
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Get { slug, json } => {
            get::run_get(&cfg, &slug, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Clear { yes } => {
            clear::run_clear(&cfg, yes).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
