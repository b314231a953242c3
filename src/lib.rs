pub mod client;
pub mod config;
pub mod config_entries;
pub mod config_flow;
pub mod coordinator;
pub mod integration;
pub mod models;
pub mod registry;
pub mod sensors;

#[cfg(test)]
mod testing;

use crate::client::command::CommandClient;
use crate::client::GrowcubeClient;
use crate::config::AppConfig;
use crate::config_entries::{ConfigEntries, EntryData};
use crate::config_flow::{message, ConfigFlow, FlowResult};
use crate::coordinator::PollSettings;
use crate::integration::Integration;
use crate::registry::InMemoryDeviceRegistry;
use crate::sensors::LogStateSink;
use anyhow::{bail, Context};
use log::{debug, error, info};
use std::sync::Arc;

pub const DOMAIN: &str = "growcube";

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting application");

    match main_loop(config).await {
        Ok(_) => info!("Application completed successfully"),
        Err(e) => {
            error!("Application error: {e:#}");
            // Print chain of error causes
            let mut source = e.source();
            while let Some(e) = source {
                error!("Caused by: {e}");
                source = e.source();
            }
            return Err(e).context("Application failed to run");
        }
    }

    Ok(())
}

async fn main_loop(config: AppConfig) -> anyhow::Result<()> {
    if config.device.ip.trim().is_empty() {
        bail!("No GrowCube address configured, set `ip` in the [DEVICE] section");
    }

    let client: Arc<dyn GrowcubeClient> = Arc::new(CommandClient::from_config(&config.client));
    let entries = ConfigEntries::new();

    debug!("Validating GrowCube at {}", config.device.ip);
    let flow = ConfigFlow::new(client.clone(), &entries, config.polling.probe_timeout());
    let input = EntryData {
        ip: config.device.ip.trim().to_string(),
    };
    let entry = match flow.step_user(Some(input)).await {
        FlowResult::CreateEntry(entry) => entry,
        FlowResult::Abort { reason } => bail!("Setup aborted: {}", message(&reason)),
        result @ FlowResult::ShowForm { .. } => {
            let key = result.base_error().unwrap_or("unknown");
            bail!("Setup failed: {}", message(key))
        }
    };

    let integration = Integration::new(
        client,
        Arc::new(InMemoryDeviceRegistry::new()),
        Arc::new(LogStateSink),
        config.polling.probe_timeout(),
        PollSettings::from(&config.polling),
    );
    integration
        .setup_entry(&entry)
        .await
        .context("Failed to set up GrowCube")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    integration.unload_all().await;
    Ok(())
}
