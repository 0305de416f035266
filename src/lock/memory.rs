use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{FleetError, Result};
use crate::lock::{LockService, LockTicket};

/// In-process lock manager. Share one instance between schedulers to model
/// several machines racing for the same names.
#[derive(Debug)]
pub struct MemoryLockService {
    held: Mutex<HashMap<String, LockTicket>>,
    ready: AtomicBool,
    releases: AtomicUsize,
}

impl Default for MemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            ready: AtomicBool::new(true),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Current holder of `name`, ignoring expired tickets.
    pub fn holder_of(&self, name: &str) -> Option<String> {
        let held = self.held.lock().ok()?;
        held.get(name)
            .filter(|t| t.expires_at > Utc::now())
            .map(|t| t.holder.clone())
    }

    /// Number of release calls that actually freed a lock.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn table(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, LockTicket>>> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(FleetError::LockService("lock service is down".to_string()));
        }
        self.held
            .lock()
            .map_err(|_| FleetError::Internal("lock table poisoned".to_string()))
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn is_ready(&self) -> Result<bool> {
        Ok(self.ready.load(Ordering::SeqCst))
    }

    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<Option<LockTicket>> {
        let mut held = self.table()?;
        let now = Utc::now();
        if let Some(current) = held.get(name) {
            if current.expires_at > now {
                return Ok(None);
            }
            tracing::warn!(lock = name, holder = %current.holder, "Taking over expired lock");
        }
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let ticket = LockTicket {
            name: name.to_string(),
            holder: holder.to_string(),
            token: Uuid::new_v4(),
            expires_at: now + ttl,
        };
        held.insert(name.to_string(), ticket.clone());
        Ok(Some(ticket))
    }

    async fn release(&self, ticket: &LockTicket) -> Result<()> {
        let mut held = self.table()?;
        if held.get(&ticket.name).is_some_and(|t| t.token == ticket.token) {
            held.remove(&ticket.name);
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
