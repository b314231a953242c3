use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::client::{fetch_status, ClientError, GrowcubeClient};
use crate::config::PollingConfig;
use crate::models::Status;

#[derive(Debug, Error)]
pub enum UpdateFailed {
    #[error("Error communicating with GrowCube API: {0}")]
    Client(#[from] ClientError),

    #[error("Error communicating with GrowCube API: no reply within {0:?}")]
    Deadline(Duration),

    #[error("GrowCube client failed: {0}")]
    ClientPanicked(String),

    #[error("Coordinator stopped, refresh result discarded")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub update_interval: Duration,
    /// Timeout handed to the client for a full-sensor read.
    pub refresh_timeout: Duration,
    /// Outer bound on the whole refresh.
    pub refresh_deadline: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(300),
            refresh_timeout: Duration::from_secs(14),
            refresh_deadline: Duration::from_secs(15),
        }
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            update_interval: config.update_interval(),
            refresh_timeout: config.refresh_timeout(),
            refresh_deadline: config.refresh_deadline(),
        }
    }
}

/// Receives every snapshot the coordinator accepts.
pub trait CoordinatorListener: Send + Sync {
    fn handle_coordinator_update(&self, status: &Status);
}

/// Periodic refresh driver shared by all entities of one device.
///
/// Holds the last good snapshot. A failed refresh leaves it in place and
/// listeners are only called after a successful one, so every entity always
/// shows values from the same snapshot.
pub struct Coordinator {
    name: String,
    host: String,
    client: Arc<dyn GrowcubeClient>,
    settings: PollSettings,
    data: watch::Sender<Arc<Status>>,
    listeners: Mutex<Vec<Arc<dyn CoordinatorListener>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    last_update_success: AtomicBool,
    stopped: AtomicBool,
}

impl Coordinator {
    pub fn new(
        host: impl Into<String>,
        client: Arc<dyn GrowcubeClient>,
        initial: Arc<Status>,
        settings: PollSettings,
    ) -> Self {
        let (data, _) = watch::channel(initial.clone());
        Self {
            name: format!("Growcube {}", initial.id),
            host: host.into(),
            client,
            settings,
            data,
            listeners: Mutex::new(Vec::new()),
            refresh_lock: tokio::sync::Mutex::new(()),
            last_update_success: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Last good snapshot.
    pub fn data(&self) -> Arc<Status> {
        self.data.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Status>> {
        self.data.subscribe()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn add_listener(&self, listener: Arc<dyn CoordinatorListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Fetch a full-sensor snapshot and hand it to every listener.
    ///
    /// Refreshes for the same device never overlap.
    pub async fn refresh(&self) -> Result<Arc<Status>, UpdateFailed> {
        let _guard = self.refresh_lock.lock().await;
        if self.is_stopped() {
            return Err(UpdateFailed::Stopped);
        }

        info!("Refreshing GrowCube status");
        let fetch = fetch_status(
            self.client.clone(),
            &self.host,
            self.settings.refresh_timeout,
            true,
        );
        let result = match tokio::time::timeout(self.settings.refresh_deadline, fetch).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(ClientError::TaskFailed(reason))) => Err(UpdateFailed::ClientPanicked(reason)),
            Ok(Err(err)) => Err(UpdateFailed::Client(err)),
            Err(_) => Err(UpdateFailed::Deadline(self.settings.refresh_deadline)),
        };

        if self.is_stopped() {
            debug!("{} stopped during refresh, discarding result", self.name);
            return Err(UpdateFailed::Stopped);
        }

        match result {
            Ok(status) => {
                info!("GrowCube refreshed all sensors: {}", status.is_refresh_complete);
                debug!("GrowCube latest status: {}", status);
                if !self.last_update_success.swap(true, Ordering::SeqCst) {
                    info!("Fetching {} data recovered", self.name);
                }
                let status = Arc::new(status);
                self.data.send_replace(status.clone());
                self.notify(&status);
                Ok(status)
            }
            Err(err) => {
                // The companion app holding the device's only session shows up here.
                if self.last_update_success.swap(false, Ordering::SeqCst) {
                    error!("Error fetching {} data: {}", self.name, err);
                } else {
                    debug!("Error fetching {} data: {}", self.name, err);
                }
                Err(err)
            }
        }
    }

    fn notify(&self, status: &Status) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.handle_coordinator_update(status);
        }
    }

    /// Start polling every `update_interval`; the first tick is one interval from now.
    pub fn spawn(self: &Arc<Self>) -> CoordinatorHandle {
        let (kill_tx, mut kill_rx) = watch::channel(false);
        let coordinator = Arc::clone(self);
        let period = self.settings.update_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = kill_rx.changed() => {
                        if changed.is_err() || *kill_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        // Failures are logged by refresh; the next tick is the retry.
                        let _ = coordinator.refresh().await;
                    }
                }
            }
            debug!("{} polling stopped", coordinator.name);
        });

        CoordinatorHandle {
            coordinator: Arc::clone(self),
            kill_tx,
            task: Some(task),
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("settings", &self.settings)
            .field("last_update_success", &self.last_update_success())
            .finish()
    }
}

/// Owner of a running polling task.
#[derive(Debug)]
pub struct CoordinatorHandle {
    coordinator: Arc<Coordinator>,
    kill_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Stop polling. A fetch already in flight runs to completion but its result is dropped.
    pub async fn stop(mut self) {
        self.coordinator.stopped.store(true, Ordering::SeqCst);
        let _ = self.kill_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!("{} polling task failed: {}", self.coordinator.name, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_status, FakeClient, Reply};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicUsize,
        last: Mutex<Option<Status>>,
    }

    impl CoordinatorListener for CountingListener {
        fn handle_coordinator_update(&self, status: &Status) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(status.clone());
        }
    }

    fn coordinator(client: Arc<FakeClient>) -> Arc<Coordinator> {
        Arc::new(Coordinator::new(
            "192.0.2.5",
            client,
            Arc::new(sample_status()),
            PollSettings::default(),
        ))
    }

    fn updated_status() -> Status {
        Status {
            temperature: 24.2,
            humidity: 61.5,
            moistures: [11, 22, 33, 44],
            is_refresh_complete: true,
            ..sample_status()
        }
    }

    #[tokio::test]
    async fn test_refresh_success_notifies_listeners() {
        let client = Arc::new(FakeClient::with_replies(vec![Reply::Status(updated_status())]));
        let coordinator = coordinator(client.clone());
        let listener = Arc::new(CountingListener::default());
        coordinator.add_listener(listener.clone());

        let status = coordinator.refresh().await.unwrap();

        assert_eq!(status.temperature, 24.2);
        assert_eq!(coordinator.data().moistures, [11, 22, 33, 44]);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        assert_eq!(listener.last.lock().as_ref().unwrap().humidity, 61.5);

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].host, "192.0.2.5");
        assert_eq!(calls[0].timeout, Duration::from_secs(14));
        assert!(calls[0].wait_for_sensor_readings);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_last_good_snapshot() {
        let client = Arc::new(FakeClient::with_replies(vec![Reply::Error("session busy".into())]));
        let coordinator = coordinator(client);
        let listener = Arc::new(CountingListener::default());
        coordinator.add_listener(listener.clone());
        let before = coordinator.data();

        let result = coordinator.refresh().await;

        assert!(matches!(result, Err(UpdateFailed::Client(_))));
        assert!(Arc::ptr_eq(&before, &coordinator.data()));
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
        assert!(!coordinator.last_update_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_deadline() {
        let client = Arc::new(FakeClient::with_replies(vec![Reply::Hang]));
        let coordinator = coordinator(client);
        let started = Instant::now();

        let result = coordinator.refresh().await;

        assert!(matches!(result, Err(UpdateFailed::Deadline(d)) if d == Duration::from_secs(15)));
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(started.elapsed() < Duration::from_secs(16));
        assert_eq!(coordinator.data().temperature, 21.7);
    }

    #[tokio::test]
    async fn test_recovers_after_failure() {
        let client = Arc::new(FakeClient::with_replies(vec![
            Reply::Error("session busy".into()),
            Reply::Status(updated_status()),
        ]));
        let coordinator = coordinator(client);

        assert!(coordinator.refresh().await.is_err());
        assert!(!coordinator.last_update_success());
        assert!(coordinator.refresh().await.is_ok());
        assert!(coordinator.last_update_success());
    }

    #[tokio::test]
    async fn test_client_panic_is_update_failed() {
        let client = Arc::new(FakeClient::with_replies(vec![Reply::Panic]));
        let coordinator = coordinator(client);
        let listener = Arc::new(CountingListener::default());
        coordinator.add_listener(listener.clone());

        let result = coordinator.refresh().await;

        assert!(matches!(result, Err(UpdateFailed::ClientPanicked(_))));
        assert_eq!(coordinator.data().temperature, 21.7);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
        assert!(!coordinator.last_update_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_survives_client_panic() {
        let client = Arc::new(FakeClient::with_replies(vec![
            Reply::Panic,
            Reply::Status(updated_status()),
        ]));
        let coordinator = coordinator(client.clone());
        let listener = Arc::new(CountingListener::default());
        coordinator.add_listener(listener.clone());
        let handle = coordinator.spawn();

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(client.calls().len(), 1);
        assert_eq!(coordinator.data().temperature, 21.7);
        assert!(!coordinator.last_update_success());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(client.calls().len(), 2);
        assert_eq!(coordinator.data().temperature, 24.2);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.last_update_success());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_subscribers_see_new_snapshot() {
        let client = Arc::new(FakeClient::with_replies(vec![Reply::Status(updated_status())]));
        let coordinator = coordinator(client);
        let mut rx = coordinator.subscribe();

        coordinator.refresh().await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().temperature, 24.2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_polling() {
        let client = Arc::new(FakeClient::with_replies(vec![
            Reply::Status(updated_status()),
            Reply::Error("session busy".into()),
        ]));
        let coordinator = coordinator(client.clone());
        let handle = coordinator.spawn();

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(client.calls().len(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(client.calls().len(), 1);
        assert_eq!(coordinator.data().temperature, 24.2);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(client.calls().len(), 2);
        assert_eq!(coordinator.data().temperature, 24.2);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_discarded_after_stop() {
        let client = Arc::new(FakeClient::with_replies(vec![Reply::Delayed(
            Duration::from_secs(10),
            updated_status(),
        )]));
        let coordinator = coordinator(client.clone());
        let listener = Arc::new(CountingListener::default());
        coordinator.add_listener(listener.clone());
        let handle = coordinator.spawn();

        // Let the first refresh start, then stop while it is in flight.
        tokio::time::sleep(Duration::from_secs(305)).await;
        assert_eq!(client.calls().len(), 1);
        handle.stop().await;

        assert_eq!(coordinator.data().temperature, 21.7);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(coordinator.refresh().await, Err(UpdateFailed::Stopped)));
    }
}
