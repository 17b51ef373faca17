use anyhow::{Context, Result};
use hookline::config::Config;

pub mod graph;
pub mod logs;
pub mod serve;

/// Load configuration from `path`, or from the standard search path
pub fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path)),
        None => Config::load().context("Failed to load configuration"),
    }
}
