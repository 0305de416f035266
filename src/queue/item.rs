use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Microseconds since the Unix epoch.
pub fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}

/// One pending invocation of an action against a site.
///
/// Identity is `(action, site)`; the queue holds at most one item per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub action: String,
    pub due_time: i64,
    pub site: String,
}

impl WorkItem {
    pub fn new(action: impl Into<String>, due_time: i64, site: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            due_time,
            site: site.into(),
        }
    }
}

/// Column key of the forward index: due time first, site as tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    pub due_time: i64,
    pub site: String,
}

impl QueueKey {
    pub fn new(due_time: i64, site: impl Into<String>) -> Self {
        Self {
            due_time,
            site: site.into(),
        }
    }

    /// Byte encoding whose lexicographic order matches `Ord`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.site.len());
        out.extend_from_slice(&encode_due(self.due_time));
        out.extend_from_slice(self.site.as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }
        let (due, site) = bytes.split_at(8);
        Some(Self {
            due_time: decode_due(due)?,
            site: String::from_utf8(site.to_vec()).ok()?,
        })
    }
}

/// Big-endian with the sign bit flipped so negative times sort first.
pub(crate) fn encode_due(due_time: i64) -> [u8; 8] {
    ((due_time as u64) ^ (1 << 63)).to_be_bytes()
}

pub(crate) fn decode_due(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}

/// A forward-index entry as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub key: QueueKey,
    pub site: String,
}

impl QueueEntry {
    pub fn due_time(&self) -> i64 {
        self.key.due_time
    }

    pub fn into_item(self, action: &str) -> WorkItem {
        WorkItem::new(action, self.key.due_time, self.site)
    }
}
