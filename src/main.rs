use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use buildwatch::config::{CliOverrides, WatchConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "buildwatch")]
#[command(version, about = "Watch remote build jobs: status, live logs and preview")]
pub struct Cli {
    /// Path to a config file (default: .buildwatch/config.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the build API. Overrides config and BUILDWATCH_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Bearer token. Overrides config and BUILDWATCH_TOKEN.
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            api_url: self.api_url.clone(),
            token: self.token.clone(),
            verbose: self.verbose,
            json_logs: self.json_logs,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the status of a job
    Status {
        job_id: String,
        /// Keep polling until the job is ready or failed
        #[arg(short, long)]
        follow: bool,
    },
    /// Print build logs for a job
    Logs {
        job_id: String,
        /// Load up to N pages of earlier lines first
        #[arg(long, default_value = "0")]
        earlier: usize,
        /// Print stored lines only, without following the live stream
        #[arg(long)]
        no_follow: bool,
    },
    /// Run the preview lifecycle for a job
    Preview {
        job_id: String,
        /// Open the preview in a browser once it is available
        #[arg(long)]
        open: bool,
    },
    /// Follow status, logs and preview of a job together
    Watch { job_id: String },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default config file
    Init {
        /// Overwrite an existing file without asking
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    if let Commands::Config {
        command: Some(ConfigCommands::Init { force }),
    } = &cli.command
    {
        return cmd::cmd_config_init(cli.config.as_deref(), &cwd, *force);
    }

    let (config, config_path) = WatchConfig::resolve(&cli.overrides(), &cwd)?;
    let _log_guard = buildwatch::logging::init(&config.logging)?;

    match &cli.command {
        Commands::Status { job_id, follow } => cmd::cmd_status(&config, job_id, *follow).await,
        Commands::Logs {
            job_id,
            earlier,
            no_follow,
        } => cmd::cmd_logs(&config, job_id, *earlier, !*no_follow).await,
        Commands::Preview { job_id, open } => cmd::cmd_preview(&config, job_id, *open).await,
        Commands::Watch { job_id } => cmd::cmd_watch(&config, job_id).await,
        Commands::Config { command } => {
            cmd::cmd_config(&config, config_path.as_deref(), command.clone())
        }
    }
}
