//! Scheduler state machine and reactor.
//!
//! A single task owns every piece of mutable state and multiplexes three
//! sources: reactor events (control bus, signals), child exit notifications
//! from the supervisor, and the [`TimerBank`]. Handlers run one at a time,
//! so the only concurrency rule to uphold is "at most one job in flight".
//!
//! # Phases
//!
//! ```text
//! Init -> WaitingForDependencies -> Scheduling <-> RunningJob -> Stopping -> Terminated
//!                  ^                     |              |
//!                  +---- Disconnected <--+--------------+
//! ```
//!
//! Storage and lock-service errors never propagate out of a handler; they move
//! the scheduler to `Disconnected`, silence storage for the reconnect delay,
//! and then send exactly one readiness probe.

pub mod event;
pub mod job;
pub mod state;
pub mod timer;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::control::{ControlMessage, ControlSender, LockServiceState};
use crate::error::FleetError;
use crate::lock::{lock_name, LockClient, LockGuard, LockService};
use crate::logging::LogHandle;
use crate::queue::{now_us, QueueEntry, QueueKey, WorkQueue};
use crate::storage::{Storage, TENANT_TABLE};
use crate::supervisor::{ChildExit, ChildSupervisor, ExitOutcome};

pub use event::{LocalSignal, SchedulerEvent};
pub use job::{Job, JobPhase};
pub use state::{Phase, SchedulerExit, SchedulerState};
pub use timer::{TimerBank, TimerKind};

/// Queue entries examined per wakeup.
const CANDIDATE_BATCH: usize = 32;
/// Tenant rows read per storage round-trip during a sweep.
const TENANT_PAGE: usize = 100;

/// Result of trying to start one queued item.
enum StartOutcome {
    Started,
    Contended,
    /// Removed by another scheduler between peek and dequeue.
    Gone,
    SpawnFailed,
    /// Storage or lock service failed; the scheduler is now disconnected.
    Aborted,
}

pub struct Scheduler {
    config: SchedulerConfig,
    phase: Phase,
    state: SchedulerState,
    storage: Arc<dyn Storage>,
    queue: WorkQueue,
    locks: LockClient,
    supervisor: ChildSupervisor,
    exits: mpsc::Receiver<ChildExit>,
    bus: ControlSender,
    timers: TimerBank,
    /// Epoch µs the wakeup timer is armed for.
    wakeup_at: Option<i64>,
    ping_pending: bool,
    single_site_enqueued: bool,
    log: Option<LogHandle>,
    exit: Option<SchedulerExit>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        storage: Arc<dyn Storage>,
        locks: Arc<dyn LockService>,
        bus: ControlSender,
    ) -> Self {
        let (exits_tx, exits) = mpsc::channel(16);
        let supervisor = ChildSupervisor::new(config.child.clone(), config.params.clone(), exits_tx);
        let state = SchedulerState {
            single_site_mode: config.single_site.clone(),
            is_cron_action: config.cron_action,
            ..Default::default()
        };

        Self {
            queue: WorkQueue::new(storage.clone()),
            locks: LockClient::new(locks, config.lock.clone()),
            storage,
            supervisor,
            exits,
            bus,
            timers: TimerBank::new(),
            wakeup_at: None,
            ping_pending: false,
            single_site_enqueued: false,
            log: None,
            exit: None,
            phase: Phase::Init,
            state,
            config,
        }
    }

    pub fn with_log_handle(mut self, log: LogHandle) -> Self {
        self.log = Some(log);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn timers(&self) -> &TimerBank {
        &self.timers
    }

    /// Epoch µs the wakeup timer targets, if armed.
    pub fn wakeup_at(&self) -> Option<i64> {
        self.wakeup_at
    }

    pub fn running_job(&self) -> Option<&Job> {
        self.state.pending_child.as_ref()
    }

    pub fn exit_status(&self) -> Option<&SchedulerExit> {
        self.exit.as_ref()
    }

    /// Wait for the supervisor's next exit notification. [`Scheduler::run`]
    /// does this itself; exposed for driving the machine step by step.
    pub async fn next_child_exit(&mut self) -> Option<ChildExit> {
        self.exits.recv().await
    }

    /// Drive the reactor until the scheduler terminates.
    pub async fn run(mut self, mut events: mpsc::Receiver<SchedulerEvent>) -> SchedulerExit {
        tracing::info!(
            action = %self.config.action,
            cron = self.config.cron_action,
            single_site = ?self.config.single_site,
            "Scheduler starting"
        );
        let mut events_open = true;

        while self.phase != Phase::Terminated {
            let next = self.timers.next();
            let (kind, deadline) =
                next.unwrap_or((TimerKind::Tick, Instant::now() + Duration::from_secs(3600)));

            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        events_open = false;
                        tracing::warn!("Event channel closed, stopping");
                        self.begin_stop().await;
                    }
                },
                Some(exit) = self.exits.recv() => {
                    self.handle_event(SchedulerEvent::ChildExited(exit)).await;
                }
                _ = tokio::time::sleep_until(deadline), if next.is_some() => {
                    self.fire_timer(kind).await;
                }
            }
        }

        let exit = self.exit.take().unwrap_or(SchedulerExit::Clean);
        tracing::info!(exit_code = exit.code(), "Scheduler terminated");
        exit
    }

    pub async fn handle_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::BusConnected => {
                if self.phase == Phase::Init {
                    self.set_phase(Phase::WaitingForDependencies);
                }
            }
            SchedulerEvent::BusDisconnected => {
                tracing::warn!(phase = %self.phase, "Control bus unavailable, waiting for reconnect");
            }
            SchedulerEvent::Control(message) => self.on_control(message).await,
            SchedulerEvent::ChildExited(exit) => self.on_child_exit(exit).await,
            SchedulerEvent::Signal(LocalSignal::Stop) => self.begin_stop().await,
            SchedulerEvent::Signal(LocalSignal::ReloadLog) => self.reload_log(None),
        }
    }

    /// Run the handler for `kind`. Timers are one-shot; handlers re-arm.
    pub async fn fire_timer(&mut self, kind: TimerKind) {
        self.timers.disarm(kind);
        tracing::trace!(timer = %kind, "Timer fired");
        match kind {
            TimerKind::Tick => self.on_tick().await,
            TimerKind::Wakeup => {
                self.wakeup_at = None;
                self.process_next().await;
            }
            TimerKind::Reconnect => self.on_reconnect(),
            TimerKind::Readiness => self.on_readiness_timeout().await,
        }
    }

    async fn on_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Ready => self.on_ready().await,
            ControlMessage::StorageReady => self.on_storage_ready().await,
            ControlMessage::StorageLost => self.on_storage_failure(FleetError::StorageUnavailable),
            ControlMessage::LockServiceStatus { status } => self.on_lock_status(status).await,
            ControlMessage::Ping { site } => self.on_ping(site).await,
            ControlMessage::Stop | ControlMessage::Quitting => self.begin_stop().await,
            ControlMessage::Log { filter } => self.reload_log(filter.as_deref()),
            ControlMessage::Help => self.bus.send(ControlMessage::Commands {
                list: ControlMessage::accepted(),
            }),
            ControlMessage::Commands { list } => {
                tracing::debug!(commands = ?list, "Peer capabilities");
            }
            ControlMessage::Unknown { command } => {
                tracing::warn!(command = %command, "Control bus did not understand our message");
            }
            other @ (ControlMessage::Register { .. }
            | ControlMessage::Unregister { .. }
            | ControlMessage::StorageStatus
            | ControlMessage::Status { .. }) => {
                self.bus.send(ControlMessage::Unknown {
                    command: other.name().to_string(),
                });
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        tracing::info!(from = %self.phase, to = %phase, "Scheduler phase change");
        self.phase = phase;
        self.bus.send(ControlMessage::Status {
            service: self.config.service_name.clone(),
            status: phase.to_string(),
        });
    }

    // ---------------------------------------------------------------------
    // Dependencies
    // ---------------------------------------------------------------------

    async fn on_ready(&mut self) {
        if self.state.stopping {
            return;
        }
        if self.phase != Phase::WaitingForDependencies {
            // Re-registration after a bus restart; queue writes are idempotent.
            tracing::debug!(phase = %self.phase, "READY while not waiting for dependencies");
            return;
        }

        self.probe_lock_service().await;
        if self.state.storage_ready {
            self.check_dependencies().await;
        } else {
            self.bus.send(ControlMessage::StorageStatus);
            if !self.timers.is_armed(TimerKind::Readiness) {
                self.timers
                    .arm_in(TimerKind::Readiness, self.config.timing.readiness_initial);
            }
        }
    }

    async fn probe_lock_service(&mut self) {
        self.state.lock_service_ready = match self.locks.is_ready().await {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!(error = %e, "Lock service probe failed");
                false
            }
        };
    }

    async fn on_storage_ready(&mut self) {
        if self.state.stopping {
            return;
        }
        match self.phase {
            Phase::Disconnected => {
                tracing::debug!("STORAGE_READY during reconnect delay, waiting for the probe");
            }
            Phase::Init | Phase::WaitingForDependencies => {
                tracing::info!("Storage ready");
                self.state.storage_ready = true;
                self.check_dependencies().await;
            }
            _ => self.state.storage_ready = true,
        }
    }

    async fn on_lock_status(&mut self, status: LockServiceState) {
        let ready = status == LockServiceState::Up;
        if ready != self.state.lock_service_ready {
            tracing::info!(status = ?status, "Lock service status changed");
        }
        self.state.lock_service_ready = ready;
        if ready && !self.state.stopping {
            self.check_dependencies().await;
        }
    }

    /// Enter `Scheduling` once storage, the lock service and the tenant
    /// metadata are all in place.
    async fn check_dependencies(&mut self) {
        if self.phase != Phase::WaitingForDependencies
            || !self.state.storage_ready
            || !self.state.lock_service_ready
        {
            return;
        }

        let present = match &self.state.single_site_mode {
            Some(site) => match self.storage.row_exists(TENANT_TABLE, site).await {
                Ok(true) => Ok(true),
                Ok(false) => Err(FleetError::MissingSite(site.clone())),
                Err(e) => Err(e),
            },
            None => self.storage.table_exists(TENANT_TABLE).await,
        };

        match present {
            Ok(true) => {
                self.timers.disarm(TimerKind::Readiness);
                self.state.not_ready_retries = 0;
                self.enter_scheduling().await;
            }
            Ok(false) => {
                tracing::info!(table = TENANT_TABLE, "Tenant table not created yet, waiting");
                if !self.timers.is_armed(TimerKind::Readiness) {
                    self.timers
                        .arm_in(TimerKind::Readiness, self.config.timing.readiness_retry);
                }
            }
            Err(e) if e.is_transient() => self.on_storage_failure(e),
            Err(e) => self.fatal(e.to_string()).await,
        }
    }

    async fn on_readiness_timeout(&mut self) {
        if self.phase != Phase::WaitingForDependencies || self.state.stopping {
            return;
        }
        self.state.not_ready_retries += 1;
        let retries = self.state.not_ready_retries;
        let max = self.config.timing.max_not_ready_retries;
        if retries > max {
            let reason = if !self.state.storage_ready {
                format!("storage not ready after {} retries", max)
            } else if !self.state.lock_service_ready {
                format!("lock service not ready after {} retries", max)
            } else {
                FleetError::TenantTableMissing(TENANT_TABLE.to_string()).to_string()
            };
            self.fatal(reason).await;
            return;
        }

        tracing::warn!(
            retries,
            max,
            storage_ready = self.state.storage_ready,
            lock_service_ready = self.state.lock_service_ready,
            "Dependencies not ready"
        );
        self.timers
            .arm_in(TimerKind::Readiness, self.config.timing.readiness_retry);
        if !self.state.storage_ready {
            self.bus.send(ControlMessage::StorageStatus);
            return;
        }
        if !self.state.lock_service_ready {
            self.probe_lock_service().await;
        }
        self.check_dependencies().await;
    }

    fn on_storage_failure(&mut self, error: FleetError) {
        if self.state.stopping || self.phase == Phase::Disconnected {
            return;
        }
        tracing::warn!(
            error = %error,
            retry_in_secs = self.config.timing.reconnect_delay.as_secs(),
            "Storage lost"
        );
        self.state.storage_ready = false;
        self.timers.disarm(TimerKind::Tick);
        self.timers.disarm(TimerKind::Wakeup);
        self.timers.disarm(TimerKind::Readiness);
        self.wakeup_at = None;
        self.timers
            .arm_in(TimerKind::Reconnect, self.config.timing.reconnect_delay);
        self.set_phase(Phase::Disconnected);
    }

    fn on_reconnect(&mut self) {
        if self.phase != Phase::Disconnected {
            return;
        }
        self.state.not_ready_retries = 0;
        self.set_phase(Phase::WaitingForDependencies);
        self.bus.send(ControlMessage::StorageStatus);
        self.timers
            .arm_in(TimerKind::Readiness, self.config.timing.readiness_retry);
    }

    // ---------------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------------

    async fn enter_scheduling(&mut self) {
        let phase = if self.state.pending_child.is_some() {
            Phase::RunningJob
        } else {
            Phase::Scheduling
        };
        self.set_phase(phase);

        match self.state.single_site_mode.clone() {
            Some(site) => {
                if !self.single_site_enqueued {
                    match self.queue.enqueue(&self.config.action, now_us(), &site).await {
                        Ok(_) => self.single_site_enqueued = true,
                        Err(e) => {
                            self.on_storage_failure(e);
                            return;
                        }
                    }
                }
            }
            None => self.timers.arm_in(TimerKind::Tick, Duration::ZERO),
        }
        self.process_next().await;
    }

    /// Periodic sweep: enqueue every tenant for `now`.
    async fn on_tick(&mut self) {
        if !matches!(self.phase, Phase::Scheduling | Phase::RunningJob)
            || self.state.single_site_mode.is_some()
        {
            return;
        }

        match self.storage.table_exists(TENANT_TABLE).await {
            Ok(true) => self.state.not_ready_retries = 0,
            Ok(false) => {
                self.state.not_ready_retries += 1;
                if self.state.not_ready_retries > self.config.timing.max_not_ready_retries {
                    self.fatal(FleetError::TenantTableMissing(TENANT_TABLE.to_string()).to_string())
                        .await;
                    return;
                }
                tracing::warn!(
                    retries = self.state.not_ready_retries,
                    "Tenant table unreadable, retrying sweep"
                );
                self.timers
                    .arm_in(TimerKind::Tick, self.config.timing.tick_retry);
                return;
            }
            Err(e) => {
                self.on_storage_failure(e);
                return;
            }
        }

        let now = now_us();
        let mut after: Option<String> = None;
        let (mut sites, mut changed) = (0usize, 0usize);
        loop {
            let page = match self
                .storage
                .row_keys(TENANT_TABLE, after.as_deref(), TENANT_PAGE)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.on_storage_failure(e);
                    return;
                }
            };
            for site in &page {
                match self.queue.enqueue(&self.config.action, now, site).await {
                    Ok(outcome) => {
                        sites += 1;
                        if outcome.changed() {
                            changed += 1;
                        }
                    }
                    Err(e) => {
                        self.on_storage_failure(e);
                        return;
                    }
                }
            }
            if page.len() < TENANT_PAGE {
                break;
            }
            after = page.last().cloned();
        }

        tracing::info!(action = %self.config.action, sites, changed, "Tenant sweep complete");
        self.timers
            .arm_in(TimerKind::Tick, self.config.timing.tick_interval);
        self.process_next().await;
    }

    async fn on_ping(&mut self, site: Option<String>) {
        if !self.state.is_cron_action {
            tracing::warn!(action = %self.config.action, site = ?site, "PING ignored, action is not CRON-style");
            return;
        }
        if self.state.stopping {
            return;
        }
        if !matches!(self.phase, Phase::Scheduling | Phase::RunningJob) {
            tracing::info!(phase = %self.phase, site = ?site, "PING dropped, storage not usable; next sweep covers it");
            return;
        }

        if let Some(site) = site {
            match self.queue.enqueue(&self.config.action, now_us(), &site).await {
                Ok(outcome) => tracing::debug!(
                    site = %site,
                    outcome = ?outcome,
                    phase = %JobPhase::Scheduled,
                    "PING enqueued"
                ),
                Err(e) => {
                    self.on_storage_failure(e);
                    return;
                }
            }
        }

        if self.state.pending_child.is_some() {
            self.ping_pending = true;
            tracing::debug!("PING recorded, replayed after the running job");
        } else {
            self.arm_wakeup(now_us());
        }
    }

    fn arm_wakeup(&mut self, at_us: i64) {
        let delay_us = (at_us - now_us()).max(0) as u64;
        self.wakeup_at = Some(at_us);
        self.timers
            .arm_in(TimerKind::Wakeup, Duration::from_micros(delay_us));
    }

    async fn candidates(&self) -> crate::error::Result<Vec<QueueEntry>> {
        let action = &self.config.action;
        match &self.state.single_site_mode {
            Some(site) => Ok(self
                .queue
                .scheduled_time(action, site)
                .await?
                .map(|due| QueueEntry {
                    key: QueueKey::new(due, site.clone()),
                    site: site.clone(),
                })
                .into_iter()
                .collect()),
            None => self.queue.scan(action, CANDIDATE_BATCH).await,
        }
    }

    /// Start the earliest due item whose lock is free, or arm the wakeup
    /// timer for the next due time.
    async fn process_next(&mut self) {
        if self.phase != Phase::Scheduling
            || self.state.pending_child.is_some()
            || self.state.stopping
        {
            return;
        }

        let candidates = match self.candidates().await {
            Ok(c) => c,
            Err(e) => {
                self.on_storage_failure(e);
                return;
            }
        };

        let now = now_us();
        let horizon = now + self.config.timing.wakeup_slack.as_micros() as i64;
        let batch_full = candidates.len() >= CANDIDATE_BATCH;
        let mut next_due: Option<i64> = None;
        let mut contended = false;
        let mut removed = false;
        // One failed acquire per lock name per pass; in global scope every
        // candidate shares the name.
        let mut busy_locks: HashSet<String> = HashSet::new();

        for entry in candidates {
            if entry.due_time() > horizon {
                next_due = Some(entry.due_time());
                break;
            }
            let name = lock_name(self.config.lock_scope, &self.config.action, &entry.site);
            if busy_locks.contains(&name) {
                tracing::trace!(site = %entry.site, lock = %name, "Lock already contended this pass");
                continue;
            }
            match self.start_job(entry, &name).await {
                StartOutcome::Started | StartOutcome::Aborted => return,
                StartOutcome::Contended => {
                    contended = true;
                    busy_locks.insert(name);
                }
                StartOutcome::Gone | StartOutcome::SpawnFailed => removed = true,
            }
            if self.phase != Phase::Scheduling {
                return;
            }
        }

        let retry = contended.then(|| now + self.config.timing.contention_retry.as_micros() as i64);
        // Batch used up by removed items: the rest of the queue is unseen.
        let backlog = (batch_full && removed && next_due.is_none()).then_some(now);
        match [next_due, retry, backlog].into_iter().flatten().min() {
            Some(at) => {
                tracing::debug!(wakeup_at = at, contended, "Wakeup armed");
                self.arm_wakeup(at);
            }
            None => {
                self.timers.disarm(TimerKind::Wakeup);
                self.wakeup_at = None;
            }
        }
    }

    async fn start_job(&mut self, entry: QueueEntry, name: &str) -> StartOutcome {
        let action = self.config.action.clone();
        tracing::debug!(action = %action, site = %entry.site, lock = %name, phase = %JobPhase::Locking, "Acquiring job lock");

        let guard = match self.locks.acquire(name).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                tracing::info!(action = %action, site = %entry.site, lock = %name, phase = %JobPhase::Skipped, "Lock held elsewhere");
                return StartOutcome::Contended;
            }
            Err(e) => {
                self.on_storage_failure(e);
                return StartOutcome::Aborted;
            }
        };

        // Removed before the child starts: a crashing job must not be retried forever.
        let site = match self.queue.dequeue(&action, &entry.key).await {
            Ok(Some(site)) => site,
            Ok(None) => {
                tracing::debug!(action = %action, site = %entry.site, "Item already taken");
                self.release_lock(guard).await;
                return StartOutcome::Gone;
            }
            Err(e) => {
                self.release_lock(guard).await;
                self.on_storage_failure(e);
                return StartOutcome::Aborted;
            }
        };

        match self.supervisor.spawn(&action, &site) {
            Ok(handle) => {
                let item = entry.into_item(&action);
                tracing::info!(
                    job_id = handle.id,
                    action = %action,
                    site = %site,
                    lock = %name,
                    phase = %JobPhase::Running,
                    "Job started"
                );
                self.state.pending_child = Some(Job::new(item, guard, handle));
                self.set_phase(Phase::RunningJob);
                StartOutcome::Started
            }
            Err(e) => {
                tracing::error!(action = %action, site = %site, error = %e, "Cannot start child, job abandoned");
                self.release_lock(guard).await;
                StartOutcome::SpawnFailed
            }
        }
    }

    async fn on_child_exit(&mut self, exit: ChildExit) {
        let matches_job = self
            .state
            .pending_child
            .as_ref()
            .is_some_and(|job| job.id() == exit.job_id);
        let Some(job) = matches_job.then(|| self.state.pending_child.take()).flatten() else {
            tracing::warn!(job_id = exit.job_id, "Exit notification for an unknown child");
            return;
        };

        let elapsed_ms = (chrono::Utc::now() - job.started_at).num_milliseconds();
        match &exit.outcome {
            ExitOutcome::Success => tracing::info!(
                job_id = exit.job_id,
                action = %job.item.action,
                site = %job.item.site,
                elapsed_ms,
                phase = %JobPhase::Completed,
                "Job finished"
            ),
            ExitOutcome::Code(_) => tracing::warn!(
                job_id = exit.job_id,
                action = %job.item.action,
                site = %job.item.site,
                outcome = %exit.outcome,
                elapsed_ms,
                "Job failed"
            ),
            ExitOutcome::Signal(_) | ExitOutcome::WaitFailed(_) => tracing::error!(
                job_id = exit.job_id,
                action = %job.item.action,
                site = %job.item.site,
                outcome = %exit.outcome,
                elapsed_ms,
                "Job terminated abnormally"
            ),
        }

        self.release_lock(job.lock).await;

        if self.state.stopping {
            self.finish_stop();
            return;
        }
        if self.state.single_site_mode.is_some() {
            tracing::info!("Single-site job done, stopping");
            self.begin_stop().await;
            return;
        }
        if self.phase == Phase::RunningJob {
            self.set_phase(Phase::Scheduling);
        }
        if std::mem::take(&mut self.ping_pending) && self.phase == Phase::Scheduling {
            tracing::debug!("Replaying deferred PING");
            self.arm_wakeup(now_us());
            return;
        }
        self.process_next().await;
    }

    /// A lock service failure on release is handled like any storage-tier loss.
    async fn release_lock(&mut self, guard: LockGuard) {
        if let Err(e) = guard.release().await {
            if e.is_transient() {
                self.on_storage_failure(e);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Shutdown
    // ---------------------------------------------------------------------

    async fn begin_stop(&mut self) {
        if self.state.stopping {
            return;
        }
        self.state.stopping = true;
        self.timers.disarm_all();
        self.wakeup_at = None;
        self.set_phase(Phase::Stopping);

        match self.state.pending_child.as_mut() {
            Some(job) => {
                if let Err(e) = job.handle.send_stop().await {
                    tracing::warn!(job_id = job.id(), error = %e, "Cannot forward STOP to child");
                }
                tracing::info!(job_id = job.id(), "Waiting for running job to exit");
            }
            None => self.finish_stop(),
        }
    }

    fn finish_stop(&mut self) {
        if self.exit.is_none() {
            self.exit = Some(SchedulerExit::Clean);
        }
        self.set_phase(Phase::Terminated);
    }

    async fn fatal(&mut self, reason: String) {
        tracing::error!(reason = %reason, "Unrecoverable condition, shutting down");
        self.exit = Some(SchedulerExit::Fatal(reason));
        self.begin_stop().await;
    }

    fn reload_log(&self, filter: Option<&str>) {
        let Some(log) = &self.log else {
            tracing::debug!("No reloadable log handle installed");
            return;
        };
        match log.reload(filter) {
            Ok(()) => tracing::info!(filter = ?filter, "Log filter reloaded"),
            Err(e) => tracing::warn!(error = %e, "Log filter unchanged"),
        }
    }
}
