//! adaptest CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "adaptest", version, about = "IRT-based adaptive testing engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and example item bank
    Init,

    /// Validate item bank files
    Validate {
        /// Path to a bank file (.toml, .json or .csv) or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Run an attempt against a simulated student
    Simulate {
        /// Path to a bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// True abilities, e.g. "Testing=0.5,Architecture=-1.0" (unlisted skills use 0.0)
        #[arg(long, default_value = "")]
        true_theta: String,

        /// Seed for the simulated responses
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Item budget (overrides the config)
        #[arg(long)]
        max_items: Option<usize>,

        /// Skills (modules) to assess (comma-separated, default: all bank skills)
        #[arg(long, visible_alias = "module")]
        skills: Option<String>,

        /// Only use items at these Bloom levels (comma-separated)
        #[arg(long)]
        bloom: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Write a JSON snapshot per attempt into this directory
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },

    /// Take an attempt interactively on stdin
    Take {
        /// Path to a bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Skills (modules) to assess (comma-separated, default: all bank skills)
        #[arg(long, visible_alias = "module")]
        skills: Option<String>,

        /// Only use items at these Bloom levels (comma-separated)
        #[arg(long)]
        bloom: Option<String>,

        /// Item budget (overrides the config)
        #[arg(long)]
        max_items: Option<usize>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Pretty-print a stored attempt snapshot
    Inspect {
        /// Snapshot JSON file
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("adaptest=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Simulate {
            bank,
            true_theta,
            seed,
            max_items,
            skills,
            bloom,
            config,
            format,
            snapshot_dir,
        } => {
            commands::simulate::execute(
                bank,
                true_theta,
                seed,
                max_items,
                skills,
                bloom,
                config,
                format,
                snapshot_dir,
            )
            .await
        }
        Commands::Take {
            bank,
            skills,
            bloom,
            max_items,
            config,
        } => commands::take::execute(bank, skills, bloom, max_items, config).await,
        Commands::Inspect { snapshot } => commands::inspect::execute(snapshot),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
