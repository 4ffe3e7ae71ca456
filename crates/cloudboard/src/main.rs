mod commands;
mod document;

use clap::{Parser, Subcommand};
use cloudboard_config::Settings;
use cloudboard_core::{CloudVendor, FeatureName};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cloudboard")]
#[command(about = "Plan and check feature onboarding for cloud accounts", long_about = None)]
struct Cli {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the usual search locations)
    #[arg(long, global = true, env = "CLOUDBOARD_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the permission catalog
    Catalog {
        /// Only this cloud (aws, azure, gcp)
        #[arg(long)]
        cloud: Option<CloudVendor>,
        /// Only this feature, with its permissions
        #[arg(long)]
        feature: Option<FeatureName>,
    },
    /// Validate the desired features of an account document
    Validate {
        /// Account document (YAML)
        file: PathBuf,
    },
    /// Show the changes needed to reach the desired features
    Plan {
        /// Account document (YAML)
        file: PathBuf,
    },
    /// Match identity artifacts against requirements
    Match {
        /// Account document (YAML)
        file: PathBuf,
    },
    /// List operations left unresolved by earlier reconciliations
    Pending,
    /// Show version information
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => {
            tracing::debug!("Using configuration file {}", path.display());
            Settings::from_path(path)?
        }
        None => cloudboard_config::load_settings()?,
    };
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // No configuration needed
    if matches!(cli.command, Commands::Version) {
        println!("cloudboard {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = load_settings(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Catalog { cloud, feature } => {
            commands::catalog::handle(&settings, cloud, feature, json)?;
        }
        Commands::Validate { file } => {
            commands::validate::handle(&settings, &file, json)?;
        }
        Commands::Plan { file } => {
            commands::plan::handle(&settings, &file, json)?;
        }
        Commands::Match { file } => {
            commands::matching::handle(&file, json)?;
        }
        Commands::Pending => {
            commands::pending::handle(&settings, json).await?;
        }
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
