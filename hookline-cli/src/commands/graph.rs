use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use hookline::{config::Config, eventlog::EventLog, graph::GraphClient};

use crate::utils::{self, format};

#[derive(Args)]
pub struct TokenArgs {
    /// Access token (defaults to graph.access_token)
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Record the calls in the configured event log
    #[arg(long)]
    record: bool,
}

#[derive(Subcommand)]
pub enum GraphCommands {
    /// List the account's conversations
    Conversations {
        #[command(flatten)]
        auth: TokenArgs,
    },
    /// List messages of a conversation
    Messages {
        /// Conversation ID
        #[arg(value_name = "CONVERSATION_ID")]
        conversation_id: String,

        /// Maximum number of messages
        #[arg(long, value_name = "N")]
        limit: Option<u32>,

        #[command(flatten)]
        auth: TokenArgs,
    },
    /// Look up a user's profile
    User {
        /// Instagram-scoped user ID
        #[arg(value_name = "USER_ID")]
        user_id: String,

        #[command(flatten)]
        auth: TokenArgs,
    },
    /// Send a text message
    Send {
        /// Recipient ID
        #[arg(value_name = "RECIPIENT_ID")]
        recipient_id: String,

        /// Message text
        #[arg(value_name = "TEXT")]
        text: String,

        #[command(flatten)]
        auth: TokenArgs,
    },
}

impl GraphCommands {
    fn auth(&self) -> &TokenArgs {
        match self {
            Self::Conversations { auth }
            | Self::Messages { auth, .. }
            | Self::User { auth, .. }
            | Self::Send { auth, .. } => auth,
        }
    }
}

pub async fn execute(config: Config, command: GraphCommands) -> Result<()> {
    let auth = command.auth();
    let token = auth
        .token
        .clone()
        .or_else(|| config.graph.access_token.clone())
        .context("No access token given (pass --token or set graph.access_token)")?;

    let mut client = GraphClient::new(&config.graph)?;
    if auth.record {
        let log = EventLog::from_config(&config.event_log)
            .await
            .context("Failed to open the event log")?;
        client = client.with_event_log(log);
    }

    match command {
        GraphCommands::Conversations { .. } => {
            let conversations = client.fetch_conversations(&token).await?;
            for conversation in &conversations {
                println!("{}", format::conversation_line(conversation));
            }
            utils::section(&format!("{} conversations", conversations.len()));
        }
        GraphCommands::Messages {
            conversation_id,
            limit,
            ..
        } => {
            let messages = client
                .fetch_conversation_messages(&conversation_id, &token, limit)
                .await?;
            for message in &messages {
                println!("{}", format::message_line(message));
            }
            utils::section(&format!("{} messages", messages.len()));
        }
        GraphCommands::User { user_id, .. } => {
            let lookup = client.fetch_user_details(&user_id, &token).await;
            if !lookup.is_found() {
                utils::warning("Lookup failed, showing placeholder profile");
            }
            let details = lookup.into_details();
            println!(
                "{} @{} ({})",
                details.id.bold(),
                details.username,
                details.name
            );
        }
        GraphCommands::Send {
            recipient_id,
            text,
            ..
        } => {
            let receipt = client.send_message(&recipient_id, &text, &token).await?;
            utils::success(&format!(
                "Delivered {} to {}",
                receipt.message_id, receipt.recipient_id
            ));
        }
    }

    Ok(())
}
