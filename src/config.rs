use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FleetError, Result};

/// How the lock guarding one job is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// `site#action`: different sites may run the same action in parallel.
    #[default]
    Site,
    /// `global#action`: at most one instance of the action anywhere in the fleet.
    Global,
}

/// Timer durations driving the reactor.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Interval between tenant sweeps.
    pub tick_interval: Duration,
    /// Delay before retrying a sweep when the tenant table cannot be read.
    pub tick_retry: Duration,
    /// Items due within this slack are started immediately.
    pub wakeup_slack: Duration,
    /// Quiet period after a storage failure before probing again.
    pub reconnect_delay: Duration,
    /// How long to wait for an unsolicited storage event after registering.
    pub readiness_initial: Duration,
    /// Delay between readiness probes once the initial wait expired.
    pub readiness_retry: Duration,
    /// Probes allowed before giving up on storage.
    pub max_not_ready_retries: u32,
    /// Retry delay when every due item is locked elsewhere.
    pub contention_retry: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5 * 60),
            tick_retry: Duration::from_secs(10),
            wakeup_slack: Duration::from_millis(10),
            reconnect_delay: Duration::from_secs(30),
            readiness_initial: Duration::from_secs(60),
            readiness_retry: Duration::from_secs(10),
            max_not_ready_retries: 3,
            contention_retry: Duration::from_secs(10),
        }
    }
}

/// Distributed lock settings.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Safety net against a crashed holder; locks are normally released explicitly.
    pub ttl: Duration,
    /// Bounded wait for a contended lock.
    pub wait: Duration,
    /// Poll interval while waiting.
    pub poll: Duration,
    /// Identity presented to the lock manager.
    pub holder: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(4 * 60 * 60),
            wait: Duration::from_secs(5),
            poll: Duration::from_millis(100),
            holder: default_holder(),
        }
    }
}

fn default_holder() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    format!("{}:{}", host, std::process::id())
}

/// Worker process launched for every job.
///
/// The child receives `args`, then `--action <action> --site <site>` and one
/// `--param name=value` pair per configured parameter. Its stdin is the
/// control pipe.
#[derive(Debug, Clone)]
pub struct ChildConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for ChildConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("fleetd-worker"),
            args: Vec::new(),
        }
    }
}

/// Control-plane message bus endpoint.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub addr: String, // host:port
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub max_line_length: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:4040".to_string(),
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            max_line_length: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name announced in REGISTER and STATUS messages.
    pub service_name: String,
    pub action: String,
    /// CRON-style actions are eligible for PING triggers.
    pub cron_action: bool,
    /// Pins the scheduler to one tenant.
    pub single_site: Option<String>,
    pub params: BTreeMap<String, String>,
    pub lock_scope: LockScope,
    pub timing: TimingConfig,
    pub lock: LockConfig,
    pub child: ChildConfig,
    pub bus: BusConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            service_name: "fleetd".to_string(),
            action: String::new(),
            cron_action: false,
            single_site: None,
            params: BTreeMap::new(),
            lock_scope: LockScope::default(),
            timing: TimingConfig::default(),
            lock: LockConfig::default(),
            child: ChildConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn cron(action: impl Into<String>) -> Self {
        Self {
            cron_action: true,
            ..Self::new(action)
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.single_site = Some(site.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_lock_scope(mut self, scope: LockScope) -> Self {
        self.lock_scope = scope;
        self
    }

    pub fn with_child(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.child = ChildConfig {
            program: program.into(),
            args,
        };
        self
    }

    /// Reject settings the scheduler cannot run with. Errors here are fatal.
    pub fn validate(&self) -> Result<()> {
        let action = self.action.as_str();
        if action.is_empty() || action.contains('#') || action.chars().any(char::is_whitespace) {
            return Err(FleetError::InvalidAction(self.action.clone()));
        }
        if let Some(site) = &self.single_site {
            if site.trim().is_empty() {
                return Err(FleetError::Config("single-site URI is empty".to_string()));
            }
        }
        if self.timing.tick_interval.is_zero() {
            return Err(FleetError::Config("tick interval must be non-zero".to_string()));
        }
        if self.timing.reconnect_delay.is_zero() || self.timing.readiness_retry.is_zero() {
            return Err(FleetError::Config(
                "reconnect and readiness delays must be non-zero".to_string(),
            ));
        }
        if self.lock.ttl.is_zero() {
            return Err(FleetError::Config("lock TTL must be non-zero".to_string()));
        }
        Ok(())
    }
}
