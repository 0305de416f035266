use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::control::{ControlConnection, ControlSender};
use crate::error::Result;
use crate::lock::LockService;
use crate::logging::LogHandle;
use crate::scheduler::{Scheduler, SchedulerExit};
use crate::shutdown::install_signal_handler;
use crate::storage::Storage;

/// How long the bus task gets to flush and unregister after the scheduler stops.
const BUS_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Wires the scheduler to the control bus, OS signals and its backends.
pub struct Daemon {
    pub config: SchedulerConfig,
    storage: Arc<dyn Storage>,
    locks: Arc<dyn LockService>,
    log: Option<LogHandle>,
}

impl Daemon {
    pub fn new(config: SchedulerConfig, storage: Arc<dyn Storage>, locks: Arc<dyn LockService>) -> Self {
        Self {
            config,
            storage,
            locks,
            log: None,
        }
    }

    pub fn with_log_handle(mut self, log: LogHandle) -> Self {
        self.log = Some(log);
        self
    }

    /// Run until the scheduler terminates.
    ///
    /// Spawns the control connection and the signal handler, then drives the
    /// scheduler reactor on the current task. Once the reactor returns the bus
    /// task is told to unregister and given a short grace period to do so.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or signal handlers
    /// cannot be installed. Runtime failures are reported through the
    /// returned [`SchedulerExit`].
    pub async fn run(self) -> Result<SchedulerExit> {
        self.config.validate()?;

        let (events_tx, events_rx) = mpsc::channel(100);
        let shutdown = CancellationToken::new();
        let (bus, outbox) = ControlSender::channel();

        let connection = ControlConnection::new(
            self.config.bus.clone(),
            self.config.service_name.clone(),
            env!("CARGO_PKG_VERSION"),
            events_tx.clone(),
            shutdown.clone(),
        );
        let bus_task = tokio::spawn(connection.run(outbox));
        let signals = match install_signal_handler(events_tx) {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.cancel();
                return Err(e);
            }
        };

        let mut scheduler = Scheduler::new(self.config, self.storage, self.locks, bus);
        if let Some(log) = self.log {
            scheduler = scheduler.with_log_handle(log);
        }
        let exit = scheduler.run(events_rx).await;

        shutdown.cancel();
        signals.abort();
        if tokio::time::timeout(BUS_DRAIN_TIMEOUT, bus_task).await.is_err() {
            tracing::warn!("Control connection did not close in time");
        }
        Ok(exit)
    }
}
