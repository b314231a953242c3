//! Scripted collaborators shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::client::{ClientError, GrowcubeClient};
use crate::models::Status;
use crate::sensors::{EntityState, StateSink};

pub(crate) fn sample_status() -> Status {
    Status {
        id: "abc123".to_string(),
        version: "1.2".to_string(),
        host: "192.0.2.5".to_string(),
        temperature: 21.7,
        humidity: 55.0,
        moistures: [10, 20, 30, 40],
        is_refresh_complete: false,
    }
}

pub(crate) enum Reply {
    Status(Status),
    Error(String),
    Delayed(Duration, Status),
    Hang,
    Panic,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub host: String,
    pub timeout: Duration,
    pub wait_for_sensor_readings: bool,
}

/// Client that answers from a queue of scripted replies.
#[derive(Default)]
pub(crate) struct FakeClient {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl GrowcubeClient for FakeClient {
    async fn get_status(
        &self,
        host: &str,
        timeout: Duration,
        wait_for_sensor_readings: bool,
    ) -> Result<Status, ClientError> {
        self.calls.lock().push(Call {
            host: host.to_string(),
            timeout,
            wait_for_sensor_readings,
        });
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Status(status)) => Ok(status),
            Some(Reply::Delayed(delay, status)) => {
                tokio::time::sleep(delay).await;
                Ok(status)
            }
            Some(Reply::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(Reply::Panic) => panic!("growcube client blew up"),
            Some(Reply::Error(stderr)) => Err(ClientError::ExitStatus {
                code: Some(1),
                stderr,
            }),
            None => Err(ClientError::ExitStatus {
                code: None,
                stderr: "no scripted reply".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    states: Mutex<Vec<EntityState>>,
}

impl RecordingSink {
    pub fn states(&self) -> Vec<EntityState> {
        self.states.lock().clone()
    }

    pub fn latest(&self, unique_id: &str) -> Option<i32> {
        self.states
            .lock()
            .iter()
            .rev()
            .find(|state| state.unique_id == unique_id)
            .map(|state| state.native_value)
    }
}

impl StateSink for RecordingSink {
    fn publish(&self, state: &EntityState) {
        self.states.lock().push(state.clone());
    }
}
