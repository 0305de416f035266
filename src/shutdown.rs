use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{FleetError, Result};
use crate::scheduler::{LocalSignal, SchedulerEvent};

/// Install a handler that turns SIGTERM/SIGINT into a stop request and
/// SIGHUP into a log filter reload.
///
/// Signals are delivered to the scheduler as ordinary events so the reactor
/// sees them in order with everything else. The task exits once the
/// scheduler drops its event receiver.
pub fn install_signal_handler(events: mpsc::Sender<SchedulerEvent>) -> Result<JoinHandle<()>> {
    let install = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| FleetError::Internal(format!("failed to install {} handler: {}", name, e)))
    };
    let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
    let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;
    let mut sighup = install(SignalKind::hangup(), "SIGHUP")?;

    Ok(tokio::spawn(async move {
        loop {
            let signal = tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    LocalSignal::Stop
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    LocalSignal::Stop
                }
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading log filter");
                    LocalSignal::ReloadLog
                }
            };
            if events.send(SchedulerEvent::Signal(signal)).await.is_err() {
                break;
            }
        }
    }))
}
