use anyhow::{Context, Result};
use config::{Config, File};
use log::{debug, info, LevelFilter};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub ip: String,
}

/// Polling cadence and fetch bounds, all in seconds.
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout: u64,
    #[serde(default = "default_refresh_deadline")]
    pub refresh_deadline: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
}

fn default_update_interval() -> u64 {
    300
}

fn default_refresh_timeout() -> u64 {
    14
}

fn default_refresh_deadline() -> u64 {
    15
}

fn default_probe_timeout() -> u64 {
    5
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            refresh_timeout: default_refresh_timeout(),
            refresh_deadline: default_refresh_deadline(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

impl PollingConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout)
    }

    pub fn refresh_deadline(&self) -> Duration {
        Duration::from_secs(self.refresh_deadline)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub args: String,
}

fn default_command() -> String {
    "growcube-status".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: String::new(),
        }
    }
}

impl ClientConfig {
    pub fn arg_list(&self) -> Vec<String> {
        self.args.split_whitespace().map(str::to_string).collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(rename = "DEVICE", alias = "device", default)]
    pub device: DeviceConfig,
    #[serde(rename = "POLLING", alias = "polling", default)]
    pub polling: PollingConfig,
    #[serde(rename = "CLIENT", alias = "client", default)]
    pub client: ClientConfig,
    #[serde(rename = "LOGGING", alias = "logging", default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self> {
        Self::from_file("config.ini")
    }

    pub fn get_log_level(&self) -> LevelFilter {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            "off" => LevelFilter::Off,
            _ => LevelFilter::Info, // Default to Info if invalid
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();
        debug!("Loading configuration from {}", config_path.display());

        let config = Config::builder()
            .add_source(File::from(config_path).format(config::FileFormat::Ini))
            .build()
            .context(format!("Failed to load config from {}", config_path.display()))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize config")?;

        Ok(app_config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_path = path.as_ref();

        let mut config_str = String::new();

        config_str.push_str(&format!("[DEVICE]\nip = {}\n\n", self.device.ip));

        config_str.push_str(&format!(
            "[POLLING]\nupdate_interval = {}\nrefresh_timeout = {}\nrefresh_deadline = {}\nprobe_timeout = {}\n\n",
            self.polling.update_interval,
            self.polling.refresh_timeout,
            self.polling.refresh_deadline,
            self.polling.probe_timeout
        ));

        config_str.push_str(&format!(
            "[CLIENT]\ncommand = {}\nargs = {}\n\n",
            self.client.command, self.client.args
        ));

        config_str.push_str(&format!("[LOGGING]\nlevel = {}\n", self.logging.level));

        fs::write(config_path, config_str)
            .context(format!("Failed to save config to {}", config_path.display()))?;

        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }
}
