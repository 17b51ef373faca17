//! Application state shared across handlers

use std::sync::Arc;

use crate::{config::Config, error::Result, eventlog::EventLog, graph::GraphClient};

/// Application state shared across handlers
///
/// The event log and Graph client are cheap handles; cloning the state
/// shares the same underlying store and connection pool.
#[derive(Clone, Debug)]
pub struct AppState {
    config: Arc<Config>,
    event_log: EventLog,
    graph: GraphClient,
}

impl AppState {
    /// Assemble state from already-built parts
    pub fn new(config: Config, event_log: EventLog, graph: GraphClient) -> Self {
        Self {
            config: Arc::new(config),
            event_log,
            graph,
        }
    }

    /// Open the event log and build a Graph client that records into it
    pub async fn from_config(config: Config) -> Result<Self> {
        let event_log = EventLog::from_config(&config.event_log).await?;
        let graph = GraphClient::new(&config.graph)?.with_event_log(event_log.clone());

        Ok(Self::new(config, event_log, graph))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the event log
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Get the Graph API client
    pub fn graph(&self) -> &GraphClient {
        &self.graph
    }
}
