use crate::scheduler::job::Job;

/// Scheduler lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    WaitingForDependencies,
    Scheduling,
    RunningJob,
    Disconnected,
    Stopping,
    Terminated,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::WaitingForDependencies => write!(f, "waiting_for_dependencies"),
            Phase::Scheduling => write!(f, "scheduling"),
            Phase::RunningJob => write!(f, "running_job"),
            Phase::Disconnected => write!(f, "disconnected"),
            Phase::Stopping => write!(f, "stopping"),
            Phase::Terminated => write!(f, "terminated"),
        }
    }
}

/// Process-wide scheduler state, touched only by the reactor.
#[derive(Debug, Default)]
pub struct SchedulerState {
    pub storage_ready: bool,
    pub lock_service_ready: bool,
    pub stopping: bool,
    pub single_site_mode: Option<String>,
    pub is_cron_action: bool,
    pub not_ready_retries: u32,
    /// At most one job in flight per scheduler instance.
    pub pending_child: Option<Job>,
}

/// How the scheduler finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerExit {
    Clean,
    Fatal(String),
}

impl SchedulerExit {
    pub fn code(&self) -> i32 {
        match self {
            SchedulerExit::Clean => 0,
            SchedulerExit::Fatal(_) => 1,
        }
    }
}
