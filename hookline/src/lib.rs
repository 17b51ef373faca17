//! # hookline
//!
//! Webhook event log and Instagram Graph API client for messaging integrations.
//!
//! ## Features
//!
//! - **Event log**: append-only JSON Lines store of webhook and API traffic, with bounded rotation
//! - **Graph API client**: conversations, messages, user lookups and sends over `reqwest`
//! - **Webhook intake**: subscription handshake and delivery logging with sender enrichment
//! - **HTTP surface**: log inspection and rotation endpoints, health and readiness probes
//! - **Graceful shutdown**: Proper signal handling (SIGTERM, SIGINT)
//!
//! ## Example
//!
//! ```rust,no_run
//! use hookline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let state = AppState::from_config(config.clone()).await?;
//!
//!     Server::new(config).serve(router(state)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod eventlog;
pub mod graph;
pub mod handlers;
pub mod health;
pub mod observability;
pub mod redact;
pub mod server;
pub mod state;
pub mod webhook;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, EventLogConfig, GraphConfig, ServiceConfig, WebhookConfig};
    pub use crate::error::{Error, Result, UpstreamError};
    pub use crate::eventlog::{
        ErrorDetails, EventKind, EventLog, EventStore, FileEventStore, LogEntry,
        MemoryEventStore, RotateOutcome, DEFAULT_RECENT_COUNT,
    };
    pub use crate::graph::{
        Conversation, DeliveryReceipt, GraphClient, Message, UserDetails, UserLookup,
        DEFAULT_MESSAGE_LIMIT,
    };
    pub use crate::handlers::router;
    pub use crate::health::{health, readiness};
    pub use crate::observability::init_tracing;
    pub use crate::server::Server;
    pub use crate::state::AppState;

    pub use axum::{
        extract::{Query, State},
        routing::{get, post},
        Json, Router,
    };
    pub use serde::{Deserialize, Serialize};
    pub use tokio;
}
