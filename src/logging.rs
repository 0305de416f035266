use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::error::{FleetError, Result};

/// Filter from `RUST_LOG`, defaulting to `info`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Handle for swapping the active log filter at runtime.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle").finish_non_exhaustive()
    }
}

impl LogHandle {
    /// Replace the filter with `directive`, or re-read `RUST_LOG` when `None`.
    /// An invalid directive leaves the current filter in place.
    pub fn reload(&self, directive: Option<&str>) -> Result<()> {
        let filter = match directive {
            Some(d) => EnvFilter::try_new(d)
                .map_err(|e| FleetError::Config(format!("invalid log filter {:?}: {}", d, e)))?,
            None => env_filter(),
        };
        self.handle
            .reload(filter)
            .map_err(|e| FleetError::Internal(format!("log filter reload failed: {}", e)))
    }
}

/// Install the global subscriber. Call once, from `main`.
pub fn init_logging() -> LogHandle {
    let (filter, handle) = reload::Layer::new(env_filter());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    LogHandle { handle }
}
