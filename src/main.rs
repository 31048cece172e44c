//! # convtree CLI
//!
//! The `convtree` binary wires the library pipeline to files and pipes.
//!
//! ## Usage
//!
//! ```bash
//! convtree --config ./config/convtree.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `convtree init` | Create the scratch database schema |
//! | `convtree build` | Raw messages in, conversation payloads out |
//! | `convtree recover` | One round of missing-message recovery |
//! | `convtree enrich` | Recompute statistics on payloads |
//! | `convtree lookup` | Fetch raw messages by id |
//!
//! Paths default to stdin/stdout; `-` means the same. Logs and progress go
//! to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use convtree::progress::ProgressMode;
use convtree::{build_cmd, config, db, enrich_cmd, lookup, migrate, recover, telemetry};

/// convtree: conversation tree reconstruction and missing-message recovery.
#[derive(Parser)]
#[command(
    name = "convtree",
    about = "Reconstructs reply-linked conversation trees, recovers missing messages, and annotates each thread",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/convtree.toml`. Only the `[db]` table is
    /// required.
    #[arg(long, global = true, default_value = "./config/convtree.toml")]
    config: PathBuf,

    /// Progress reporting on stderr. Defaults to human output on a TTY,
    /// otherwise off.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the scratch database schema.
    ///
    /// Idempotent; `build` also runs it.
    Init,

    /// Build conversation payloads from raw messages.
    ///
    /// Reads one message per line (activity-streams or original format),
    /// reconstructs every reply tree, and writes one time-sorted payload
    /// per tree. Referenced messages that are not in the input become
    /// missing placeholders.
    Build {
        /// Raw message lines. Defaults to stdin.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Payload output. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Brand roster CSV (`handle,id`). Overrides `[brands].path`.
        #[arg(long)]
        brands: Option<PathBuf>,
    },

    /// Run one round of missing-message recovery.
    ///
    /// Looks up every placeholder through the lookup service, splices the
    /// recovered messages in, and registers the new gaps they reveal.
    /// Requires the bearer token environment variable.
    Recover {
        #[arg(long)]
        input: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,

        /// Recompute statistics on every payload after splicing.
        #[arg(long)]
        enrich: bool,

        /// Brand roster CSV, used with `--enrich`.
        #[arg(long)]
        brands: Option<PathBuf>,
    },

    /// Recompute statistics on conversation payloads.
    Enrich {
        #[arg(long)]
        input: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        brands: Option<PathBuf>,
    },

    /// Fetch raw messages by id through the lookup service.
    Lookup {
        /// One id per line. Defaults to stdin.
        #[arg(long)]
        ids: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Build {
            input,
            output,
            brands,
        } => {
            build_cmd::run_build(
                &cfg,
                input.as_deref(),
                output.as_deref(),
                brands.as_deref(),
                progress.as_ref(),
            )
            .await?;
        }
        Commands::Recover {
            input,
            output,
            enrich,
            brands,
        } => {
            recover::run_recover(
                &cfg,
                input.as_deref(),
                output.as_deref(),
                enrich,
                brands.as_deref(),
                progress.as_ref(),
            )
            .await?;
        }
        Commands::Enrich {
            input,
            output,
            brands,
        } => {
            enrich_cmd::run_enrich(&cfg, input.as_deref(), output.as_deref(), brands.as_deref())?;
        }
        Commands::Lookup { ids, output } => {
            lookup::run_lookup(&cfg, ids.as_deref(), output.as_deref()).await?;
        }
    }

    Ok(())
}
