use crate::control::ControlMessage;
use crate::supervisor::ChildExit;

/// Local (OS signal) requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSignal {
    Stop,
    ReloadLog,
}

/// Everything the reactor reacts to, apart from its own timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    BusConnected,
    BusDisconnected,
    Control(ControlMessage),
    ChildExited(ChildExit),
    Signal(LocalSignal),
}
