//! Child process supervision.
//!
//! One worker process is started per job. Its stdin is the control pipe,
//! used only to deliver `STOP`. A reaper task waits on the process and posts
//! a [`ChildExit`] into the reactor, so the reactor itself never blocks on
//! `wait`.

pub mod exit;

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;

use crate::config::ChildConfig;
use crate::error::{FleetError, Result};

pub use exit::{ChildExit, ExitOutcome};

/// Line written on the control pipe to ask a child to stop.
pub const STOP_COMMAND: &[u8] = b"STOP\n";

/// Parent-side handle to a running child.
#[derive(Debug)]
pub struct JobHandle {
    pub id: u64,
    pub pid: Option<u32>,
    pub action: String,
    pub site: String,
    control: Option<ChildStdin>,
}

impl JobHandle {
    /// Forward a cooperative STOP. The child is never killed; the pipe is
    /// closed afterwards, so later calls do nothing.
    pub async fn send_stop(&mut self) -> Result<()> {
        let Some(mut pipe) = self.control.take() else {
            return Ok(());
        };
        pipe.write_all(STOP_COMMAND)
            .await
            .map_err(FleetError::ControlPipe)?;
        pipe.flush().await.map_err(FleetError::ControlPipe)?;
        tracing::info!(job_id = self.id, pid = ?self.pid, "STOP sent to child");
        Ok(())
    }
}

#[derive(Debug)]
pub struct ChildSupervisor {
    config: ChildConfig,
    params: BTreeMap<String, String>,
    exits: mpsc::Sender<ChildExit>,
    next_id: u64,
}

impl ChildSupervisor {
    pub fn new(
        config: ChildConfig,
        params: BTreeMap<String, String>,
        exits: mpsc::Sender<ChildExit>,
    ) -> Self {
        Self {
            config,
            params,
            exits,
            next_id: 0,
        }
    }

    fn command(&self, action: &str, site: &str) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--action")
            .arg(action)
            .arg("--site")
            .arg(site);
        for (name, value) in &self.params {
            cmd.arg("--param").arg(format!("{}={}", name, value));
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);
        cmd
    }

    /// Start the worker for `(action, site)` and register its reaper.
    pub fn spawn(&mut self, action: &str, site: &str) -> Result<JobHandle> {
        let mut child = self.command(action, site).spawn().map_err(FleetError::Spawn)?;

        self.next_id += 1;
        let id = self.next_id;
        let pid = child.id();
        let control = child.stdin.take();

        let exits = self.exits.clone();
        tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => ExitOutcome::from(status),
                Err(e) => ExitOutcome::WaitFailed(e.to_string()),
            };
            if exits.send(ChildExit { job_id: id, pid, outcome }).await.is_err() {
                tracing::debug!(job_id = id, "Reactor gone, exit notification dropped");
            }
        });

        tracing::info!(job_id = id, pid = ?pid, action, site, "Child started");
        Ok(JobHandle {
            id,
            pid,
            action: action.to_string(),
            site: site.to_string(),
            control,
        })
    }
}
