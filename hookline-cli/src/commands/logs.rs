use anyhow::{Context, Result};
use clap::Subcommand;
use hookline::{config::Config, eventlog::EventLog};

use crate::utils::{self, format};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show the most recent entries, oldest first
    Recent {
        /// Number of entries (defaults to event_log.default_count)
        #[arg(long, short = 'n', value_name = "N")]
        count: Option<usize>,

        /// Print entries as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Drop all but the newest entries
    Rotate {
        /// Entries to keep (defaults to event_log.default_keep)
        #[arg(long, short, value_name = "N")]
        keep: Option<usize>,
    },
}

pub async fn execute(config: Config, command: LogsCommands) -> Result<()> {
    if config.event_log.path.is_none() {
        anyhow::bail!("No event log path configured (set event_log.path)");
    }

    let log = EventLog::from_config(&config.event_log)
        .await
        .context("Failed to open the event log")?;

    match command {
        LogsCommands::Recent { count, json } => recent(&log, count, json).await,
        LogsCommands::Rotate { keep } => {
            rotate(&log, keep.unwrap_or(config.event_log.default_keep)).await
        }
    }
}

async fn recent(log: &EventLog, count: Option<usize>, json: bool) -> Result<()> {
    let entries = log.recent(count).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        utils::info("Event log is empty");
        return Ok(());
    }

    for entry in &entries {
        println!("{}", format::entry_line(entry));
    }
    utils::section(&format!("{} entries", entries.len()));

    Ok(())
}

async fn rotate(log: &EventLog, keep: usize) -> Result<()> {
    let outcome = log.rotate(keep).await?;

    if outcome.removed == 0 {
        utils::info(&format!(
            "Nothing to rotate, {} entries within the limit of {}",
            outcome.kept, keep
        ));
    } else {
        utils::success(&format!(
            "Rotated event log: removed {}, kept {}",
            outcome.removed, outcome.kept
        ));
    }

    Ok(())
}
