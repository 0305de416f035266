//! Control-plane message bus: message set and the auto-reconnecting link.

pub mod connection;
pub mod message;

use tokio::sync::mpsc;

pub use connection::{ConnectionState, ControlConnection};
pub use message::{ControlMessage, Inbound, LockServiceState};

/// Outbound side of the control connection.
///
/// Unbounded so that the reactor never waits on the bus; messages sent while
/// no connection task is listening are dropped.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControlMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: ControlMessage) {
        let command = message.name();
        if self.tx.send(message).is_err() {
            tracing::debug!(command, "Control connection closed, message dropped");
        }
    }
}
