//! Persistent, time-ordered work queue.
//!
//! Two tables back each action:
//!
//! - **forward** (`backend_queue`): row = action, column = encoded
//!   [`QueueKey`] `(due_time, site)`, value = site. Column order is due order.
//! - **reverse** (`backend_index`): row = action, column = site, value = due
//!   time. Used to find and replace an existing item without scanning.
//!
//! Every write touching both tables goes through one atomic batch so the two
//! indexes never disagree.

pub mod item;

use std::sync::Arc;

use crate::error::Result;
use crate::storage::{Mutation, Storage};

pub use item::{now_us, QueueEntry, QueueKey, WorkItem};
use item::{decode_due, encode_due};

pub const QUEUE_TABLE: &str = "backend_queue";
pub const INDEX_TABLE: &str = "backend_index";

/// What [`WorkQueue::enqueue`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Inserted,
    /// An item due later was moved up to the new due time.
    Replaced { previous: i64 },
    /// An item due at or before the requested time already exists; nothing written.
    AlreadyDueSooner { existing: i64 },
}

impl Enqueued {
    pub fn changed(&self) -> bool {
        !matches!(self, Enqueued::AlreadyDueSooner { .. })
    }
}

#[derive(Clone)]
pub struct WorkQueue {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").finish_non_exhaustive()
    }
}

impl WorkQueue {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Schedule `site` for `action` at `due_time` (µs since epoch).
    ///
    /// Keeps the earliest due time per `(action, site)`. Any error means the
    /// storage tier is unreachable and nothing was written.
    pub async fn enqueue(&self, action: &str, due_time: i64, site: &str) -> Result<Enqueued> {
        let existing = self
            .storage
            .get_cell(INDEX_TABLE, action, site.as_bytes())
            .await?;

        let mut batch = Vec::with_capacity(3);
        let outcome = match existing.as_deref().map(decode_due) {
            Some(Some(previous)) if previous <= due_time => {
                tracing::debug!(action, site, existing = previous, due_time, "Already scheduled sooner");
                return Ok(Enqueued::AlreadyDueSooner { existing: previous });
            }
            Some(Some(previous)) => {
                batch.push(Mutation::delete(
                    QUEUE_TABLE,
                    action,
                    QueueKey::new(previous, site).encode(),
                ));
                Enqueued::Replaced { previous }
            }
            Some(None) => {
                tracing::warn!(action, site, "Corrupt reverse index entry, overwriting");
                Enqueued::Inserted
            }
            None => Enqueued::Inserted,
        };

        batch.push(Mutation::put(
            QUEUE_TABLE,
            action,
            QueueKey::new(due_time, site).encode(),
            site.as_bytes().to_vec(),
        ));
        batch.push(Mutation::put(
            INDEX_TABLE,
            action,
            site.as_bytes().to_vec(),
            encode_due(due_time).to_vec(),
        ));
        self.storage.apply(batch).await?;

        tracing::debug!(action, site, due_time, outcome = ?outcome, "Work item enqueued");
        Ok(outcome)
    }

    /// Drop the item stored under `key`, returning its site.
    ///
    /// Returns `Ok(None)` when the entry is already gone, so repeating a
    /// dequeue is harmless.
    pub async fn dequeue(&self, action: &str, key: &QueueKey) -> Result<Option<String>> {
        let column = key.encode();
        let Some(value) = self.storage.get_cell(QUEUE_TABLE, action, &column).await? else {
            return Ok(None);
        };
        let site = String::from_utf8_lossy(&value).into_owned();

        let mut batch = vec![Mutation::delete(QUEUE_TABLE, action, column)];
        let reverse = self
            .storage
            .get_cell(INDEX_TABLE, action, site.as_bytes())
            .await?;
        // Only drop the reverse entry if it still describes this forward entry.
        if reverse.as_deref().and_then(decode_due) == Some(key.due_time) {
            batch.push(Mutation::delete(INDEX_TABLE, action, site.as_bytes().to_vec()));
        }
        self.storage.apply(batch).await?;

        tracing::debug!(action, site = %site, due_time = key.due_time, "Work item dequeued");
        Ok(Some(site))
    }

    /// The earliest-due entry for `action`, without removing it.
    pub async fn peek_earliest(&self, action: &str) -> Result<Option<QueueEntry>> {
        Ok(self.scan(action, 1).await?.into_iter().next())
    }

    /// The first `limit` entries of the action's timeline.
    pub async fn scan(&self, action: &str, limit: usize) -> Result<Vec<QueueEntry>> {
        let cells = self.storage.first_cells(QUEUE_TABLE, action, limit).await?;
        Ok(cells
            .into_iter()
            .filter_map(|(column, value)| match QueueKey::decode(&column) {
                Some(key) => Some(QueueEntry {
                    key,
                    site: String::from_utf8_lossy(&value).into_owned(),
                }),
                None => {
                    tracing::warn!(action, "Skipping undecodable queue column");
                    None
                }
            })
            .collect())
    }

    /// Due time currently recorded for `(action, site)`, per the reverse index.
    pub async fn scheduled_time(&self, action: &str, site: &str) -> Result<Option<i64>> {
        Ok(self
            .storage
            .get_cell(INDEX_TABLE, action, site.as_bytes())
            .await?
            .as_deref()
            .and_then(decode_due))
    }
}
