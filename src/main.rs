// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Juju sandbox CLI - run bundles and recorded clients against a fake Juju

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use juju_sandbox::commands::{self, replay::Protocol, Output};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "juju-sandbox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, env = "JUJU_SANDBOX_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR", global = true)]
    no_color: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a bundle into a fresh sandbox environment
    Import {
        /// Bundle file (YAML or JSON)
        bundle: PathBuf,

        /// Bundle to deploy when the file holds several
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Replay recorded client requests through a sandbox shim
    Replay {
        /// File with one JSON request per line
        requests: PathBuf,

        /// Wire protocol of the requests
        #[arg(short, long, value_enum, default_value = "go")]
        protocol: Protocol,
    },

    /// Show the effective configuration
    Config {
        /// Print only the default configuration file location
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 if cli.quiet => tracing::Level::ERROR,
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.json, cli.no_color);
    let load_config = || juju_sandbox::config::load(cli.config.as_deref());

    // Execute command
    match cli.command {
        Commands::Import { bundle, name } => {
            let config = load_config()?;
            commands::import::run(&config, &bundle, name.as_deref(), output).await
        }
        Commands::Replay { requests, protocol } => {
            let config = load_config()?;
            commands::replay::run(&config, &requests, protocol, output).await
        }
        Commands::Config { path } => {
            let config = load_config()?;
            commands::config::run(&config, path, output)
        }
        Commands::Completions { shell } => commands::completions::run(shell, &mut Cli::command()),
    }
}
