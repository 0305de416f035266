pub mod config;
pub mod control;
pub mod daemon;
pub mod error;
pub mod lock;
pub mod logging;
pub mod queue;
pub mod scheduler;
pub mod shutdown;
pub mod storage;
pub mod supervisor;
