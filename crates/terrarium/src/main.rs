//! `terrarium`: deploy the edge terrarium to Docker Compose or k3d

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use terrarium_orchestration::BackendKind;
use tracing::Level;

mod commands;

#[derive(Parser)]
#[command(name = "terrarium")]
#[command(about = "Edge Terrarium - deploy the terrarium services locally")]
#[command(version)]
struct Cli {
    /// Project root holding apps/, configs/ and certs/
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Log every command line and its output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy every service
    Deploy {
        /// Where to deploy
        #[arg(value_enum)]
        target: Target,

        /// Remove previous containers and volumes before starting
        #[arg(long)]
        clean: bool,

        /// Use the images already present instead of building them
        #[arg(long)]
        no_build: bool,
    },

    /// Validate settings and every app descriptor
    Validate,

    /// Vault secret management
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Target {
    /// Docker Compose
    Compose,
    /// Local k3d cluster
    Cluster,
}

impl From<Target> for BackendKind {
    fn from(target: Target) -> Self {
        match target {
            Target::Compose => BackendKind::Compose,
            Target::Cluster => BackendKind::Cluster,
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum VaultCommands {
    /// Enable the kv engine and store every configured secret
    Init,
    /// Show Vault health
    Status,
    /// List stored secret paths
    Secrets,
    /// Print one secret as JSON
    Get {
        /// Secret path, e.g. custom-client/config
        path: String,
    },
    /// Store a JSON object at a path
    Set {
        /// Secret path, e.g. custom-client/config
        path: String,
        /// JSON object of key/value pairs
        data: String,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    smol::block_on(async {
        match cli.command {
            Commands::Deploy {
                target,
                clean,
                no_build,
            } => commands::deploy::run(&cli.project_dir, target.into(), clean, !no_build).await,
            Commands::Validate => commands::validate::run(&cli.project_dir),
            Commands::Vault { command } => commands::vault::run(&cli.project_dir, command).await,
        }
    })
}
