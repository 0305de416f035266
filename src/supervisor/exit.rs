use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// How a child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Code(i32),
    Signal(i32),
    WaitFailed(String),
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            ExitOutcome::Success
        } else if let Some(code) = status.code() {
            ExitOutcome::Code(code)
        } else if let Some(signal) = status.signal() {
            ExitOutcome::Signal(signal)
        } else {
            ExitOutcome::WaitFailed(format!("unrecognised status {:?}", status))
        }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Success => write!(f, "success"),
            ExitOutcome::Code(code) => write!(f, "exit code {}", code),
            ExitOutcome::Signal(signal) => write!(f, "killed by signal {}", signal),
            ExitOutcome::WaitFailed(e) => write!(f, "wait failed: {}", e),
        }
    }
}

/// Posted by the reaper once a child has been waited on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildExit {
    pub job_id: u64,
    pub pid: Option<u32>,
    pub outcome: ExitOutcome,
}
