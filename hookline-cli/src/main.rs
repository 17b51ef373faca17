use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod utils;

use commands::graph::GraphCommands;
use commands::logs::LogsCommands;

/// hookline - webhook event log and Instagram Graph API tooling
#[derive(Parser)]
#[command(name = "hookline")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the standard search path)
    #[arg(long, short, global = true, value_name = "PATH", env = "HOOKLINE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook HTTP service
    Serve,
    /// Inspect and maintain the webhook event log
    Logs {
        #[command(subcommand)]
        command: LogsCommands,
    },
    /// Call the Graph API directly
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Serve => commands::serve::execute(config).await,
            Commands::Logs { command } => commands::logs::execute(config, command).await,
            Commands::Graph { command } => commands::graph::execute(config, command).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);

            if let Some(source) = e.source() {
                eprintln!("\n{} {}", "Caused by:".yellow(), source);
            }

            std::process::exit(1);
        }
    }
}
