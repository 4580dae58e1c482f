use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nexus_api::ChatBackend;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(10);
pub const MIN_HEALTH_INTERVAL: Duration = Duration::from_secs(1);

/// Freshest known liveness of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServerStatus {
    #[default]
    Checking,
    Healthy,
    Unhealthy,
}

impl ServerStatus {
    pub fn from_probe<E>(outcome: &Result<(), E>) -> Self {
        if outcome.is_ok() {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Checking => "Connecting...",
            Self::Healthy => "Online",
            Self::Unhealthy => "Offline",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// Periodic health probe running on its own task until stopped or dropped.
pub struct HealthMonitor {
    status: watch::Receiver<ServerStatus>,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Probes immediately, then once per `period`.
    pub fn start(backend: Arc<dyn ChatBackend>, period: Duration) -> Self {
        let period = period.max(MIN_HEALTH_INTERVAL);
        let (status_tx, status) = watch::channel(ServerStatus::Checking);
        let task = tokio::spawn(Self::run(backend, period, status_tx));

        tracing::debug!(?period, "health monitor started");
        Self {
            status,
            task: Some(task),
        }
    }

    async fn run(
        backend: Arc<dyn ChatBackend>,
        period: Duration,
        status_tx: watch::Sender<ServerStatus>,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let outcome = backend.check_health().await;
            let status = ServerStatus::from_probe(&outcome);

            if let Err(error) = &outcome {
                tracing::debug!(error = %error, "health probe failed");
            }
            let previous = status_tx.send_replace(status);
            if previous != status {
                tracing::info!(from = %previous, to = %status, "server status changed");
            }
        }
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the recurring probe. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("health monitor stopped");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
