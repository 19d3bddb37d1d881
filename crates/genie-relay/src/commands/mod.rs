//! CLI command implementations.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use genie_relay::build_info;
use genie_relay::config::Config;
use genie_relay::genie::HttpGenieClient;
use genie_relay::service::GenieService;

pub mod ask;
pub mod chat;
pub mod spaces;

/// Load configuration and wire the service against the REST backend.
pub async fn build_service(config_path: &str) -> Result<GenieService> {
    let config = Config::load(config_path)
        .await
        .with_context(|| format!("Failed to load config '{}'", config_path))?;

    if config.genie.host().is_none() {
        bail!(
            "Genie host is not configured. Set `genie.host` in '{}' (e.g. `${{DATABRICKS_HOST}}`).",
            config_path
        );
    }
    if config.genie.auth().is_none() {
        bail!(
            "No Genie credentials configured. Set `genie.token`, or `genie.client_id` and \
             `genie.client_secret`, in '{}'.",
            config_path
        );
    }

    let http = reqwest::Client::builder()
        .user_agent(format!("genie-relay/{}", build_info::VERSION))
        .build()
        .context("Failed to build HTTP client")?;
    let client = HttpGenieClient::from_config(http, &config.genie)
        .context("Genie host or credentials missing")?;

    info!(
        version = %build_info::version_string(),
        default_space = ?config.genie.space_id(),
        service_principal = config.genie.uses_service_principal(),
        "Genie relay ready"
    );

    let service = GenieService::new(Arc::new(client), &config);
    service.start_session_cleanup(&config.sessions);
    Ok(service)
}
