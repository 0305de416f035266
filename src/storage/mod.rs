//! Boundary to the column-oriented storage engine.
//!
//! Data is organised as tables of rows, each row holding byte-keyed columns
//! kept in ascending key order. The scheduler never caches anything read
//! through this trait beyond the current call.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStorage;

/// Tenant table; one row per site.
pub const TENANT_TABLE: &str = "sites";

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put {
        table: String,
        row: String,
        column: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        table: String,
        row: String,
        column: Vec<u8>,
    },
}

impl Mutation {
    pub fn put(table: &str, row: &str, column: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Mutation::Put {
            table: table.to_string(),
            row: row.to_string(),
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn delete(table: &str, row: &str, column: impl Into<Vec<u8>>) -> Self {
        Mutation::Delete {
            table: table.to_string(),
            row: row.to_string(),
            column: column.into(),
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool>;

    async fn row_exists(&self, table: &str, row: &str) -> Result<bool>;

    /// Row keys in ascending order, starting strictly after `after`.
    async fn row_keys(&self, table: &str, after: Option<&str>, limit: usize) -> Result<Vec<String>>;

    async fn get_cell(&self, table: &str, row: &str, column: &[u8]) -> Result<Option<Vec<u8>>>;

    /// The first `limit` cells of a row in ascending column order.
    async fn first_cells(
        &self,
        table: &str,
        row: &str,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply every mutation or none of them.
    async fn apply(&self, batch: Vec<Mutation>) -> Result<()>;
}
