use async_trait::async_trait;
use log::{debug, error};
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::client::{ClientError, GrowcubeClient};
use crate::config::ClientConfig;
use crate::models::Status;

/// Client that delegates to an external status helper program.
///
/// The helper is run as `<command> [args..] --host <host> --timeout <secs> [--wait]`
/// and must print one JSON status object on stdout.
#[derive(Debug, Clone)]
pub struct CommandClient {
    program: String,
    args: Vec<String>,
}

impl CommandClient {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.command.clone(), config.arg_list())
    }

    fn build_args(&self, host: &str, timeout: Duration, wait: bool) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--host".to_string());
        args.push(host.to_string());
        args.push("--timeout".to_string());
        args.push(timeout.as_secs().max(1).to_string());
        if wait {
            args.push("--wait".to_string());
        }
        args
    }
}

#[async_trait]
impl GrowcubeClient for CommandClient {
    async fn get_status(
        &self,
        host: &str,
        timeout: Duration,
        wait_for_sensor_readings: bool,
    ) -> Result<Status, ClientError> {
        let start = Instant::now();
        let args = self.build_args(host, timeout, wait_for_sensor_readings);
        debug!("Running {} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command.args(&args).kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ClientError::Timeout {
                    host: host.to_string(),
                    timeout,
                })
            }
        };
        debug!("Status helper took: {} ms", start.elapsed().as_millis());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("Status helper failed for {}: {}", host, stderr);
            return Err(ClientError::ExitStatus {
                code: output.status.code(),
                stderr,
            });
        }

        let status: Status = serde_json::from_slice(&output.stdout)?;
        Ok(status)
    }
}
