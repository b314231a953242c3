use indexmap::IndexMap;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::client::{fetch_status, ClientError, GrowcubeClient};
use crate::config_entries::{ConfigEntries, ConfigEntry, EntryData};

pub const STEP_USER: &str = "user";

/// A field of the setup form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormField {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

pub const USER_SCHEMA: &[FormField] = &[FormField {
    name: "ip",
    description: "IP address of the GrowCube",
    required: true,
}];

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Cannot connect to GrowCube: {0}")]
    CannotConnect(String),

    /// The status call carries no credentials yet, so nothing raises this.
    #[error("Invalid authentication")]
    InvalidAuth,

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl FlowError {
    pub fn key(&self) -> &'static str {
        match self {
            FlowError::CannotConnect(_) => "cannot_connect",
            FlowError::InvalidAuth => "invalid_auth",
            FlowError::Unknown(_) => "unknown",
        }
    }
}

/// User-facing text for a form error or abort reason.
pub fn message(key: &str) -> &'static str {
    match key {
        "cannot_connect" => "Failed to connect",
        "invalid_auth" => "Invalid authentication",
        "already_configured" => "Device is already configured",
        _ => "Unexpected error",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDevice {
    pub title: String,
    pub unique_id: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    ShowForm {
        step_id: &'static str,
        schema: &'static [FormField],
        errors: IndexMap<String, String>,
    },
    CreateEntry(ConfigEntry),
    Abort {
        reason: String,
    },
}

impl FlowResult {
    /// Error key shown on the form, if any.
    pub fn base_error(&self) -> Option<&str> {
        match self {
            FlowResult::ShowForm { errors, .. } => errors.get("base").map(String::as_str),
            _ => None,
        }
    }
}

/// Probe the address once and report what the device says about itself.
pub async fn validate_input(
    client: Arc<dyn GrowcubeClient>,
    input: &EntryData,
    timeout: Duration,
) -> Result<ValidatedDevice, FlowError> {
    let fetch = fetch_status(client, &input.ip, timeout, false);
    let status = match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(status)) => status,
        Ok(Err(ClientError::TaskFailed(reason))) => {
            return Err(FlowError::Unknown(reason));
        }
        Ok(Err(err)) => {
            error!("Exception while validating growcube host: {}", err);
            return Err(FlowError::CannotConnect(err.to_string()));
        }
        Err(_) => {
            error!("Timed out validating growcube host {}", input.ip);
            return Err(FlowError::CannotConnect(format!("no reply within {:?}", timeout)));
        }
    };

    info!("Got status {}", status);
    if status.id.trim().is_empty() {
        return Err(FlowError::Unknown(format!(
            "device at {} reported no identifier",
            input.ip
        )));
    }

    Ok(ValidatedDevice {
        title: "GrowCube".to_string(),
        unique_id: status.id,
        version: status.version,
    })
}

/// Interactive setup of one GrowCube.
pub struct ConfigFlow<'a> {
    client: Arc<dyn GrowcubeClient>,
    entries: &'a ConfigEntries,
    probe_timeout: Duration,
}

impl<'a> ConfigFlow<'a> {
    pub const VERSION: u32 = 1;

    pub fn new(client: Arc<dyn GrowcubeClient>, entries: &'a ConfigEntries, probe_timeout: Duration) -> Self {
        Self {
            client,
            entries,
            probe_timeout,
        }
    }

    pub async fn step_user(&self, user_input: Option<EntryData>) -> FlowResult {
        let mut errors = IndexMap::new();

        if let Some(input) = user_input {
            match validate_input(self.client.clone(), &input, self.probe_timeout).await {
                Ok(info) => {
                    let unique_id = info.unique_id.clone();
                    return match self
                        .entries
                        .add_unique(Self::VERSION, &info.title, info.unique_id, input)
                    {
                        Some(entry) => FlowResult::CreateEntry(entry),
                        None => {
                            warn!("GrowCube {} is already configured", unique_id);
                            FlowResult::Abort {
                                reason: "already_configured".to_string(),
                            }
                        }
                    };
                }
                Err(err) => {
                    if matches!(err, FlowError::Unknown(_)) {
                        error!("Unexpected exception: {}", err);
                    }
                    errors.insert("base".to_string(), err.key().to_string());
                }
            }
        }

        FlowResult::ShowForm {
            step_id: STEP_USER,
            schema: USER_SCHEMA,
            errors,
        }
    }
}
