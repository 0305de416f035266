//! Fleet-wide mutual exclusion through a TTL-bounded lock manager.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{LockConfig, LockScope};
use crate::error::Result;

pub use memory::MemoryLockService;

/// Proof of ownership handed out by the lock manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTicket {
    pub name: String,
    pub holder: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait LockService: Send + Sync {
    async fn is_ready(&self) -> Result<bool>;

    /// Single non-blocking attempt; `None` when someone else holds `name`.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<Option<LockTicket>>;

    /// Releasing a lock that is no longer held by `ticket` is a no-op.
    async fn release(&self, ticket: &LockTicket) -> Result<()>;
}

/// Lock name for one job of `action` against `site`.
pub fn lock_name(scope: LockScope, action: &str, site: &str) -> String {
    match scope {
        LockScope::Site => format!("{}#{}", site, action),
        LockScope::Global => format!("global#{}", action),
    }
}

#[derive(Clone)]
pub struct LockClient {
    service: Arc<dyn LockService>,
    config: LockConfig,
}

impl LockClient {
    pub fn new(service: Arc<dyn LockService>, config: LockConfig) -> Self {
        Self { service, config }
    }

    pub fn holder(&self) -> &str {
        &self.config.holder
    }

    pub async fn is_ready(&self) -> Result<bool> {
        self.service.is_ready().await
    }

    /// Acquire `name`, waiting at most the configured bound.
    ///
    /// `Ok(None)` means contention, which is expected; errors mean the lock
    /// service itself is unreachable.
    pub async fn acquire(&self, name: &str) -> Result<Option<LockGuard>> {
        let deadline = Instant::now() + self.config.wait;
        loop {
            if let Some(ticket) = self
                .service
                .try_acquire(name, &self.config.holder, self.config.ttl)
                .await?
            {
                tracing::debug!(lock = name, token = %ticket.token, "Lock acquired");
                return Ok(Some(LockGuard {
                    service: self.service.clone(),
                    ticket: Some(ticket),
                }));
            }
            if Instant::now() + self.config.poll > deadline {
                tracing::debug!(lock = name, "Lock contended");
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll).await;
        }
    }
}

/// A held lock. Released exactly once: explicitly through
/// [`LockGuard::release`], or from `Drop` on any other exit path.
pub struct LockGuard {
    service: Arc<dyn LockService>,
    ticket: Option<LockTicket>,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("ticket", &self.ticket).finish()
    }
}

impl LockGuard {
    pub fn name(&self) -> &str {
        self.ticket.as_ref().map(|t| t.name.as_str()).unwrap_or("")
    }

    pub async fn release(mut self) -> Result<()> {
        match self.ticket.take() {
            Some(ticket) => {
                let result = self.service.release(&ticket).await;
                match &result {
                    Ok(()) => tracing::debug!(lock = %ticket.name, "Lock released"),
                    Err(e) => {
                        tracing::warn!(lock = %ticket.name, error = %e, "Lock release failed, left to TTL")
                    }
                }
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let service = self.service.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = service.release(&ticket).await {
                        tracing::warn!(lock = %ticket.name, error = %e, "Lock release failed, left to TTL");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(lock = %ticket.name, "No runtime to release lock, left to TTL");
            }
        }
    }
}
