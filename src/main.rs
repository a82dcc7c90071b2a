use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use garden::config::{CliOverrides, Config};

mod cmd;

#[derive(Parser)]
#[command(name = "garden")]
#[command(version, about = "Grow containerized gRPC services from a one-line description")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding `.garden/` and `repos/` (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Skip the startup infrastructure checks
    #[arg(long, global = true)]
    pub skip_preflight: bool,

    /// Failed attempts tolerated per task. Overrides garden.toml.
    #[arg(long, global = true)]
    pub error_budget: Option<u32>,

    /// Lines of failure output kept per diagnostic. Overrides garden.toml.
    #[arg(long, global = true)]
    pub diagnostic_lines: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create `.garden/` with a default garden.toml and the `repos/` directory
    Init,
    /// Create a task and run it through every stage
    Create {
        /// Service name; sanitized into the task's directory name
        #[arg(short, long)]
        name: String,
        /// What the service should do, in plain language
        #[arg(short, long)]
        description: String,
    },
    /// Run every unfinished task from its last completed stage
    Resume,
    /// List tasks and their stages
    List,
    /// Show a task's stage, last error and transition history
    Status { id: i64 },
    /// View or validate configuration
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
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            verbose: self.verbose,
            error_budget: self.error_budget,
            diagnostic_lines: self.diagnostic_lines,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let root = match cli.root.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = Config::with_overrides(&root, &cli.overrides())?;

    let log_dir = config.is_initialized().then_some(config.log_dir.as_path());
    let _log_guard = garden::logging::init(log_dir, config.verbose);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Create { name, description } => {
            cmd::cmd_create(&config, name, description, cli.skip_preflight).await?
        }
        Commands::Resume => cmd::cmd_resume(&config, cli.skip_preflight).await?,
        Commands::List => cmd::cmd_list(&config)?,
        Commands::Status { id } => cmd::cmd_status(&config, *id)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
