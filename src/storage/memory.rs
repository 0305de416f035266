use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{FleetError, Result};
use crate::storage::{Mutation, Storage, TENANT_TABLE};

type Row = BTreeMap<Vec<u8>, Vec<u8>>;
type Table = BTreeMap<String, Row>;

/// In-process storage engine.
///
/// Tables are created implicitly by the first write. The store can be
/// switched offline to exercise outage handling; while offline every call
/// fails with [`FleetError::StorageUnavailable`].
#[derive(Debug)]
pub struct MemoryStorage {
    tables: RwLock<BTreeMap<String, Table>>,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn create_table(&self, table: &str) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default();
    }

    pub async fn drop_table(&self, table: &str) {
        self.tables.write().await.remove(table);
    }

    /// Register a tenant site (creates the tenant table if needed).
    pub async fn add_tenant(&self, site: &str) {
        let mut tables = self.tables.write().await;
        let row = tables
            .entry(TENANT_TABLE.to_string())
            .or_default()
            .entry(site.to_string())
            .or_default();
        row.insert(b"created".to_vec(), chrono::Utc::now().to_rfc3339().into_bytes());
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of trait calls made so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of cells currently stored in a row.
    pub async fn row_len(&self, table: &str, row: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .and_then(|t| t.get(row))
            .map(|r| r.len())
            .unwrap_or(0)
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FleetError::StorageUnavailable)
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.enter()?;
        Ok(self.tables.read().await.contains_key(table))
    }

    async fn row_exists(&self, table: &str, row: &str) -> Result<bool> {
        self.enter()?;
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .is_some_and(|t| t.get(row).is_some_and(|r| !r.is_empty())))
    }

    async fn row_keys(&self, table: &str, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        self.enter()?;
        let tables = self.tables.read().await;
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let lower = match after {
            Some(key) => Bound::Excluded(key.to_string()),
            None => Bound::Unbounded,
        };
        Ok(t.range((lower, Bound::Unbounded))
            .filter(|(_, r)| !r.is_empty())
            .take(limit)
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn get_cell(&self, table: &str, row: &str, column: &[u8]) -> Result<Option<Vec<u8>>> {
        self.enter()?;
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .and_then(|t| t.get(row))
            .and_then(|r| r.get(column))
            .cloned())
    }

    async fn first_cells(
        &self,
        table: &str,
        row: &str,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.enter()?;
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .and_then(|t| t.get(row))
            .map(|r| {
                r.iter()
                    .take(limit)
                    .map(|(c, v)| (c.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply(&self, batch: Vec<Mutation>) -> Result<()> {
        self.enter()?;
        // Single write guard: readers observe all of the batch or none of it.
        let mut tables = self.tables.write().await;
        for mutation in batch {
            match mutation {
                Mutation::Put {
                    table,
                    row,
                    column,
                    value,
                } => {
                    tables
                        .entry(table)
                        .or_default()
                        .entry(row)
                        .or_default()
                        .insert(column, value);
                }
                Mutation::Delete { table, row, column } => {
                    if let Some(r) = tables.get_mut(&table).and_then(|t| t.get_mut(&row)) {
                        r.remove(&column);
                    }
                }
            }
        }
        Ok(())
    }
}
