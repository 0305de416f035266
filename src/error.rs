use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Storage unavailable")]
    StorageUnavailable,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock service error: {0}")]
    LockService(String),

    #[error("Invalid action name: {0:?}")]
    InvalidAction(String),

    #[error("No tenant metadata for site {0}")]
    MissingSite(String),

    #[error("Tenant table {0} does not exist")]
    TenantTableMissing(String),

    #[error("Failed to spawn child: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Control pipe error: {0}")]
    ControlPipe(#[source] std::io::Error),

    #[error("Control bus I/O error: {0}")]
    Bus(#[from] std::io::Error),

    #[error("Control message codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("Malformed control message: {0}")]
    Message(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Storage and lock-service failures are treated as "connection lost",
    /// never as a logical rejection.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FleetError::StorageUnavailable | FleetError::Storage(_) | FleetError::LockService(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
