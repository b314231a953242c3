use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

use crate::models::Status;

pub mod command;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to start status helper: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("No status from {host} within {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    #[error("Status helper exited with {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Malformed status: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Status fetch task failed: {0}")]
    TaskFailed(String),
}

/// Access to a GrowCube's status. The wire protocol lives behind this trait.
#[async_trait]
pub trait GrowcubeClient: Send + Sync {
    /// Fetch one status snapshot from the device at `host`.
    ///
    /// With `wait_for_sensor_readings` set, the call waits (up to `timeout`)
    /// until the device has reported every sensor, otherwise it returns as
    /// soon as the identity fields are known.
    async fn get_status(
        &self,
        host: &str,
        timeout: Duration,
        wait_for_sensor_readings: bool,
    ) -> Result<Status, ClientError>;
}

/// Aborts the fetch task when the waiting side gives up.
struct AbortOnDrop(JoinHandle<Result<Status, ClientError>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn describe_join_error(err: JoinError) -> String {
    if !err.is_panic() {
        return "fetch task cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("client panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("client panicked: {}", msg)
    } else {
        "client panicked".to_string()
    }
}

/// Run one `get_status` call on its own task.
///
/// A panic inside the client comes back as [`ClientError::TaskFailed`]
/// instead of unwinding into the caller. Dropping the returned future aborts
/// the task.
pub async fn fetch_status(
    client: Arc<dyn GrowcubeClient>,
    host: &str,
    timeout: Duration,
    wait_for_sensor_readings: bool,
) -> Result<Status, ClientError> {
    let host = host.to_string();
    let mut task = AbortOnDrop(tokio::spawn(async move {
        client
            .get_status(&host, timeout, wait_for_sensor_readings)
            .await
    }));

    match (&mut task.0).await {
        Ok(result) => result,
        Err(err) => Err(ClientError::TaskFailed(describe_join_error(err))),
    }
}
