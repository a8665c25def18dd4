//! Kometa Dashboard Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod config_store;
pub mod jellyfin;
pub mod run_log;
pub mod server;
pub mod status;
pub mod storage;
pub mod supervisor;

// Re-export commonly used types for convenience
pub use config_store::{ConfigStore, Configuration};
pub use jellyfin::{JellyfinApi, JellyfinClient, UpstreamError};
pub use run_log::{LogEntry, LogLevel, RunLog};
pub use server::{run_server, RequestsLoggingLevel};
pub use status::StatusReporter;
pub use storage::StorageError;
pub use supervisor::{ExecutionError, ProcessSupervisor, RunOutcome, RunRecord, WorkerSpec};
