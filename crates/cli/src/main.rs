//! Surveyor CLI: the main entry point.
//!
//! Commands:
//! - `run`: Write a cited systematic review from a corpus file
//! - `init`: Create the default config file
//! - `config`: Show the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "surveyor",
    about = "Surveyor: cited systematic reviews from a corpus of papers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a systematic review
    Run {
        /// What the review is about
        #[arg(short, long)]
        query: String,

        /// Corpus file (JSON array or JSON lines of records)
        #[arg(short, long)]
        corpus: PathBuf,

        /// Write the markdown here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rank chunks by keyword overlap instead of embeddings
        #[arg(long)]
        no_embeddings: bool,

        /// Skip the chunk index; sections see only summaries
        #[arg(long)]
        no_index: bool,

        /// Count tokens with the 4-characters heuristic
        #[arg(long)]
        heuristic_tokens: bool,
    },

    /// Create ~/.surveyor/config.toml with defaults
    Init,

    /// Show the effective configuration
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,

        /// Validate instead of printing
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so a review printed to stdout stays clean
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            query,
            corpus,
            output,
            no_embeddings,
            no_index,
            heuristic_tokens,
        } => {
            commands::run::run(commands::run::RunArgs {
                query,
                corpus,
                output,
                no_embeddings,
                no_index,
                heuristic_tokens,
            })
            .await?
        }
        Commands::Init => commands::init::run()?,
        Commands::Config { path, validate } => {
            if path {
                commands::config_cmd::path();
            } else if validate {
                commands::config_cmd::validate()?;
            } else {
                commands::config_cmd::show()?;
            }
        }
    }

    Ok(())
}
