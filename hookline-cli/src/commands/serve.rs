use anyhow::{Context, Result};
use hookline::{
    config::Config, handlers::router, observability::init_tracing, server::Server,
    state::AppState,
};

pub async fn execute(config: Config) -> Result<()> {
    init_tracing(&config)?;

    let state = AppState::from_config(config.clone())
        .await
        .context("Failed to initialize application state")?;

    if config.webhook.verify_token.is_none() {
        tracing::warn!("No webhook verify token configured, subscription handshakes will be refused");
    }
    if config.graph.access_token.is_none() {
        tracing::info!("No Graph access token configured, sender enrichment disabled");
    }

    Server::new(config).serve(router(state)).await?;

    Ok(())
}
