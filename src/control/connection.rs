use std::time::Duration;

use futures::SinkExt;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::config::BusConfig;
use crate::control::message::{ControlMessage, Inbound};
use crate::error::Result;
use crate::scheduler::SchedulerEvent;

/// Connection lifecycle, logged on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered,
    Unregistering,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Registered => write!(f, "registered"),
            ConnectionState::Unregistering => write!(f, "unregistering"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// How one connected session ended.
enum SessionEnd {
    Lost,
    Shutdown,
}

/// Backoff delay with up to 25% random jitter.
fn jittered(base: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let jitter_ms = rand::thread_rng().gen_range(0..=base_ms / 4);
    Duration::from_millis(base_ms + jitter_ms)
}

/// Permanent link to the control-plane bus.
///
/// Reconnects with exponential backoff, re-registers after every reconnect
/// and turns inbound frames into [`SchedulerEvent`]s.
pub struct ControlConnection {
    config: BusConfig,
    service: String,
    version: String,
    events: mpsc::Sender<SchedulerEvent>,
    shutdown: CancellationToken,
    state: ConnectionState,
}

impl ControlConnection {
    pub fn new(
        config: BusConfig,
        service: impl Into<String>,
        version: impl Into<String>,
        events: mpsc::Sender<SchedulerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            service: service.into(),
            version: version.into(),
            events,
            shutdown,
            state: ConnectionState::Closed,
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, addr = %self.config.addr, "Control connection state");
            self.state = state;
        }
    }

    /// Run until the shutdown token is cancelled or the reactor goes away.
    pub async fn run(mut self, mut outbox: mpsc::UnboundedReceiver<ControlMessage>) {
        let mut backoff = self.config.reconnect_min;

        loop {
            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = TcpStream::connect(&self.config.addr) => result,
            };

            match connected {
                Ok(stream) => {
                    backoff = self.config.reconnect_min;
                    match self.session(stream, &mut outbox).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Lost) => {
                            tracing::warn!(addr = %self.config.addr, "Control bus connection lost");
                        }
                        Err(e) => {
                            tracing::warn!(addr = %self.config.addr, error = %e, "Control bus connection failed");
                        }
                    }
                    if self.events.send(SchedulerEvent::BusDisconnected).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(addr = %self.config.addr, error = %e, "Cannot reach control bus");
                }
            }

            let delay = jittered(backoff);
            tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnecting to control bus");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            backoff = (backoff * 2).min(self.config.reconnect_max);
        }

        self.set_state(ConnectionState::Closed);
    }

    async fn session(
        &mut self,
        stream: TcpStream,
        outbox: &mut mpsc::UnboundedReceiver<ControlMessage>,
    ) -> Result<SessionEnd> {
        let mut framed = Framed::new(
            stream,
            LinesCodec::new_with_max_length(self.config.max_line_length),
        );

        // Anything queued while offline describes a state the bus no longer cares about.
        let mut stale = 0usize;
        while outbox.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(stale, "Discarded messages queued while disconnected");
        }

        let register = ControlMessage::Register {
            service: self.service.clone(),
            version: self.version.clone(),
        };
        framed.send(register.to_line()?).await?;
        self.set_state(ConnectionState::Registered);
        tracing::info!(addr = %self.config.addr, service = %self.service, "Registered with control bus");
        if self.events.send(SchedulerEvent::BusConnected).await.is_err() {
            return Ok(SessionEnd::Shutdown);
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.set_state(ConnectionState::Unregistering);
                    while let Ok(message) = outbox.try_recv() {
                        framed.send(message.to_line()?).await?;
                    }
                    let unregister = ControlMessage::Unregister { service: self.service.clone() };
                    framed.send(unregister.to_line()?).await?;
                    return Ok(SessionEnd::Shutdown);
                }
                frame = framed.next() => match frame {
                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match ControlMessage::parse(&line) {
                            Ok(Inbound::Message(message)) => {
                                tracing::debug!(command = message.name(), "Control message received");
                                if self.events.send(SchedulerEvent::Control(message)).await.is_err() {
                                    return Ok(SessionEnd::Shutdown);
                                }
                            }
                            Ok(Inbound::Unrecognized(command)) => {
                                tracing::debug!(command = %command, "Unrecognized control command");
                                framed.send(ControlMessage::Unknown { command }.to_line()?).await?;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Dropping malformed control frame");
                            }
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Lost),
                },
                Some(message) = outbox.recv() => {
                    framed.send(message.to_line()?).await?;
                }
            }
        }
    }
}
