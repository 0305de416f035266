use std::time::Duration;
use tokio::time::Instant;

/// The four one-shot timers driving the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Periodic tenant sweep.
    Tick,
    /// Due time of the earliest queued item.
    Wakeup,
    /// End of the quiet period after a storage failure.
    Reconnect,
    /// Fallback readiness probe while waiting for dependencies.
    Readiness,
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerKind::Tick => write!(f, "tick"),
            TimerKind::Wakeup => write!(f, "wakeup"),
            TimerKind::Reconnect => write!(f, "reconnect"),
            TimerKind::Readiness => write!(f, "readiness"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TimerBank {
    tick: Option<Instant>,
    wakeup: Option<Instant>,
    reconnect: Option<Instant>,
    readiness: Option<Instant>,
}

impl TimerBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<Instant> {
        match kind {
            TimerKind::Tick => &mut self.tick,
            TimerKind::Wakeup => &mut self.wakeup,
            TimerKind::Reconnect => &mut self.reconnect,
            TimerKind::Readiness => &mut self.readiness,
        }
    }

    pub fn arm_at(&mut self, kind: TimerKind, at: Instant) {
        *self.slot(kind) = Some(at);
    }

    pub fn arm_in(&mut self, kind: TimerKind, delay: Duration) {
        self.arm_at(kind, Instant::now() + delay);
    }

    pub fn disarm(&mut self, kind: TimerKind) {
        *self.slot(kind) = None;
    }

    pub fn disarm_all(&mut self) {
        *self = Self::default();
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        match kind {
            TimerKind::Tick => self.tick,
            TimerKind::Wakeup => self.wakeup,
            TimerKind::Reconnect => self.reconnect,
            TimerKind::Readiness => self.readiness,
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadline(kind).is_some()
    }

    /// The armed timer that fires first. Ties go to the earlier kind in
    /// declaration order.
    pub fn next(&self) -> Option<(TimerKind, Instant)> {
        [
            TimerKind::Tick,
            TimerKind::Wakeup,
            TimerKind::Reconnect,
            TimerKind::Readiness,
        ]
        .into_iter()
        .filter_map(|kind| self.deadline(kind).map(|at| (kind, at)))
        .min_by_key(|&(_, at)| at)
    }
}
