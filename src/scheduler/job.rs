use chrono::{DateTime, Utc};

use crate::lock::LockGuard;
use crate::queue::WorkItem;
use crate::supervisor::JobHandle;

/// Lifecycle of one invocation, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Scheduled,
    Locking,
    Running,
    Completed,
    Skipped,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Scheduled => write!(f, "scheduled"),
            JobPhase::Locking => write!(f, "locking"),
            JobPhase::Running => write!(f, "running"),
            JobPhase::Completed => write!(f, "completed"),
            JobPhase::Skipped => write!(f, "skipped"),
        }
    }
}

/// A work item paired with its lock and live child.
#[derive(Debug)]
pub struct Job {
    pub item: WorkItem,
    pub lock: LockGuard,
    pub handle: JobHandle,
    pub started_at: DateTime<Utc>,
}

impl Job {
    pub fn new(item: WorkItem, lock: LockGuard, handle: JobHandle) -> Self {
        Self {
            item,
            lock,
            handle,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.handle.id
    }
}
