//! CLI command implementations

pub mod config;
pub mod decrypt;
pub mod encrypt;
pub mod grant;
pub mod revoke;
pub mod run;

use anyhow::{Context, Result};
use camino::Utf8Path;
use keyferry_cloud::{GoogleSessionFactory, SessionFactory};
use keyferry_core::{ConfigOverrides, HandoffSettings, KeyferryConfig};
use std::sync::Arc;
use tracing::debug;

/// Load keyferry.yaml and layer flag and environment values on top
pub(crate) fn load_config(
    path: Option<&Utf8Path>,
    overrides: &ConfigOverrides,
) -> Result<KeyferryConfig> {
    let mut config = KeyferryConfig::load(path).context("Failed to load configuration")?;
    if let Some(found) = &config.config_path {
        debug!("Using configuration from {}", found);
    }
    config.apply(overrides);
    Ok(config)
}

pub(crate) fn load_settings(
    path: Option<&Utf8Path>,
    overrides: &ConfigOverrides,
) -> Result<HandoffSettings> {
    Ok(load_config(path, overrides)?.settings)
}

pub(crate) fn session_factory(settings: &HandoffSettings) -> Result<Arc<dyn SessionFactory>> {
    let factory =
        GoogleSessionFactory::new(&settings.endpoints).context("Failed to set up API clients")?;
    Ok(Arc::new(factory))
}

/// One line per error in the chain, skipping causes the message above
/// already spells out
pub fn render_error(err: &anyhow::Error) -> String {
    let mut rendered = err.to_string();
    let mut last = rendered.clone();
    for cause in err.chain().skip(1) {
        let text = cause.to_string();
        if !last.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        last = text;
    }
    rendered
}
