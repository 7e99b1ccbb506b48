//! infra-agent: turns natural-language infrastructure requests into applied Terraform
//!
//! A ReAct agent reasons over a small tool set (knowledge base, Terraform sandbox,
//! internet search) until it can give a final answer.

mod agent;
mod commands;
mod knowledge;
mod progress;
mod repl;
mod sandbox;
mod session;
mod tools;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::session::SessionOptions;

#[derive(Debug, Parser)]
#[command(name = "infra-agent")]
#[command(about = "Natural-language Terraform agent for AWS", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Apply without asking for confirmation
    #[arg(long, global = true, env = "INFRA_AGENT_AUTO")]
    auto: bool,

    /// Model to use (overrides config)
    #[arg(short, long, global = true, env = "INFRA_AGENT_MODEL")]
    model: Option<String>,

    /// Path to infra-agent.toml (default: search upwards from the current directory)
    #[arg(short, long, global = true, env = "INFRA_AGENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the interactive REPL (default)
    Chat {
        /// Do not print agent steps
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run a single goal and exit
    Ask {
        /// The goal, e.g. "create an S3 bucket named logs with versioning"
        goal: Vec<String>,

        /// Only print the final answer
        #[arg(short, long)]
        quiet: bool,
    },

    /// Destroy every resource in the sandbox working directory
    Destroy,

    /// Build the knowledge index from the example documents
    Index {
        /// Documents directory (overrides config)
        #[arg(long)]
        docs: Option<PathBuf>,

        /// Index output path (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the model backend, terraform binary and knowledge index
    Check,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Write a default infra-agent.toml
    Init {
        /// Where to write it (default: ./infra-agent.toml)
        path: Option<PathBuf>,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\x1b[91mError:\x1b[0m {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    // Loaded per command: `config init` must work without an existing config file
    let load = || commands::load_config(cli.config.as_deref(), cli.model.clone());
    let opts = |quiet| SessionOptions { auto: cli.auto, quiet };

    match cli.command.unwrap_or(Commands::Chat { quiet: false }) {
        Commands::Chat { quiet } => repl::run(load()?, opts(quiet)).await?,
        Commands::Ask { goal, quiet } => {
            let goal = goal.join(" ");
            if !commands::ask(load()?, opts(quiet), &goal).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Destroy => commands::destroy(load()?).await?,
        Commands::Index { docs, output } => commands::index(load()?, docs, output).await?,
        Commands::Check => commands::check(load()?).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init { path } => commands::config_init(path).await?,
            ConfigAction::Show => commands::config_show(&load()?).await?,
        },
    }

    Ok(ExitCode::SUCCESS)
}
