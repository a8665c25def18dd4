//! Worker process supervision.
//!
//! Launches the external Kometa worker, captures its output incrementally,
//! enforces a wall-clock timeout, classifies the outcome and appends one run
//! log entry per attempt. At most one execution is in flight at any time; a
//! concurrent call is rejected with [`ExecutionError::Busy`].

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config_store::Configuration;
use crate::run_log::{LogLevel, RunLog};

/// Hard wall-clock bound on a single worker run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

lazy_static! {
    // Announcement phrases the worker prints on stdout. Counting matches is
    // a best-effort heuristic: runs whose phrasing differs are undercounted.
    static ref COLLECTION_CREATED_RE: Regex =
        Regex::new(r#"(?i)collection\s+"[^"]+"\s+créée"#).unwrap();
    static ref ITEMS_PROCESSED_RE: Regex =
        Regex::new(r"(?i)\d+\s+éléments?\s+ajoutés?").unwrap();
}

/// Worker launch/run failures. Nonzero worker exits are not errors: they
/// come back as a [`RunRecord`] with [`RunOutcome::Failure`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("worker entry point not found: {0:?}")]
    WorkerNotFound(PathBuf),

    #[error("worker timed out after {timeout_secs}s")]
    Timeout {
        timeout_secs: u64,
        /// Output captured up to the kill, for diagnosis.
        stdout: String,
        stderr: String,
    },

    #[error("an execution is already in flight")]
    Busy,

    #[error("failed to launch worker: {0}")]
    Launch(#[source] std::io::Error),

    #[error("worker I/O failure: {0}")]
    Io(#[source] std::io::Error),
}

/// Outcome classification of one worker run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Failure,
    Timeout,
}

/// Structured result of one execution attempt. Built once, never mutated;
/// summarized into exactly one run log entry.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub outcome: RunOutcome,
    /// Count of collection-creation announcements found in stdout.
    pub collections_created: usize,
    /// Count of items-processed announcements found in stdout.
    pub items_processed: usize,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub finished_at: DateTime<Utc>,
}

/// How to invoke the worker entry point.
#[derive(Clone, Debug)]
pub struct WorkerSpec {
    /// Interpreter the entry point is fed to, e.g. `python3`. `None` runs
    /// the entry point directly as an executable.
    pub interpreter: Option<String>,
    pub entry_point: PathBuf,
}

impl WorkerSpec {
    pub fn python(entry_point: PathBuf) -> Self {
        WorkerSpec {
            interpreter: Some("python3".to_string()),
            entry_point,
        }
    }

    pub fn executable(entry_point: PathBuf) -> Self {
        WorkerSpec {
            interpreter: None,
            entry_point,
        }
    }

    /// Pick the invocation mode from server configuration: an explicit
    /// interpreter wins, `.py` entry points default to `python3`, anything
    /// else runs directly.
    pub fn resolve(entry_point: PathBuf, interpreter: Option<String>) -> Self {
        match interpreter {
            Some(interpreter) => WorkerSpec {
                interpreter: Some(interpreter),
                entry_point,
            },
            None if entry_point.extension().is_some_and(|ext| ext == "py") => {
                WorkerSpec::python(entry_point)
            }
            None => WorkerSpec::executable(entry_point),
        }
    }
}

/// Supervises worker executions. Owns the run log for writes.
pub struct ProcessSupervisor {
    worker: WorkerSpec,
    config_path: PathBuf,
    run_log: Arc<RunLog>,
    timeout: Duration,
    running: tokio::sync::Mutex<()>,
}

impl ProcessSupervisor {
    pub fn new(worker: WorkerSpec, config_path: PathBuf, run_log: Arc<RunLog>) -> Self {
        ProcessSupervisor {
            worker,
            config_path,
            run_log,
            timeout: DEFAULT_TIMEOUT,
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the worker once against the given configuration.
    ///
    /// Launch failures before a process exists propagate without touching
    /// the run log. Success, failure and timeout each append exactly one
    /// entry; an append failure is reported on the diagnostic channel and
    /// never replaces the primary result.
    pub async fn execute(&self, config: &Configuration) -> Result<RunRecord, ExecutionError> {
        let _guard = self.running.try_lock().map_err(|_| ExecutionError::Busy)?;

        if !self.worker.entry_point.exists() {
            return Err(ExecutionError::WorkerNotFound(
                self.worker.entry_point.clone(),
            ));
        }

        let mut command = match &self.worker.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&self.worker.entry_point);
                command
            }
            None => Command::new(&self.worker.entry_point),
        };

        info!("Launching worker {:?}", self.worker.entry_point);
        let mut child = command
            .arg(&self.config_path)
            .env("JELLYFIN_URL", &config.connection.url)
            .env("JELLYFIN_API_KEY", &config.connection.api_key)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecutionError::Launch)?;

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Launch(std::io::Error::other("no stdout pipe")))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Launch(std::io::Error::other("no stderr pipe")))?;

        // Incremental capture, so partial output survives a timeout kill.
        // Raw bytes; conversion happens at the snapshot points so invalid
        // UTF-8 from the worker never stops the capture.
        let stdout_buffer = Arc::new(StdMutex::new(Vec::new()));
        let stderr_buffer = Arc::new(StdMutex::new(Vec::new()));
        let stdout_task = drain_pipe(stdout_pipe, stdout_buffer.clone());
        let stderr_task = drain_pipe(stderr_pipe, stderr_buffer.clone());

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return Err(ExecutionError::Io(err)),
            Err(_) => {
                if let Err(err) = child.kill().await {
                    warn!("Failed to kill timed out worker: {}", err);
                }
                // Grandchildren may keep the pipes open, do not wait for EOF.
                stdout_task.abort();
                stderr_task.abort();
                let stdout = snapshot_buffer(&stdout_buffer);
                let stderr = snapshot_buffer(&stderr_buffer);
                let timeout_secs = self.timeout.as_secs();
                self.append_run_entry(
                    LogLevel::Error,
                    &format!("Script Kometa interrompu après {}s (délai dépassé)", timeout_secs),
                );
                return Err(ExecutionError::Timeout {
                    timeout_secs,
                    stdout,
                    stderr,
                });
            }
        };

        // Normal termination: let the readers drain the remaining output.
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        let stdout = snapshot_buffer(&stdout_buffer);
        let stderr = snapshot_buffer(&stderr_buffer);

        let (collections_created, items_processed) = derive_stats(&stdout);
        let exit_code = status.code();

        let record = if status.success() {
            let record = RunRecord {
                outcome: RunOutcome::Success,
                collections_created,
                items_processed,
                stdout,
                stderr: String::new(),
                exit_code,
                finished_at: Utc::now(),
            };
            self.append_run_entry(
                LogLevel::Success,
                &format!(
                    "Script Kometa exécuté avec succès: {} collections créées, {} éléments traités",
                    collections_created, items_processed
                ),
            );
            record
        } else {
            let record = RunRecord {
                outcome: RunOutcome::Failure,
                collections_created,
                items_processed,
                stdout,
                stderr,
                exit_code,
                finished_at: Utc::now(),
            };
            let detail = record
                .stderr
                .lines()
                .next()
                .unwrap_or("aucune sortie d'erreur");
            self.append_run_entry(
                LogLevel::Error,
                &format!(
                    "Échec du script Kometa (code {}): {}",
                    exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    detail
                ),
            );
            record
        };

        Ok(record)
    }

    fn append_run_entry(&self, level: LogLevel, message: &str) {
        if let Err(err) = self.run_log.append(level, message) {
            warn!("Failed to append run log entry: {}", err);
        }
    }
}

fn drain_pipe<R>(mut pipe: R, buffer: Arc<StdMutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buffer.lock().unwrap().extend_from_slice(&chunk[..n]),
                Err(err) => {
                    warn!("Worker output capture stopped: {}", err);
                    break;
                }
            }
        }
    })
}

fn snapshot_buffer(buffer: &Arc<StdMutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned()
}

/// Count announcement phrases in the captured stdout. Best effort by
/// design: a worker with different phrasing undercounts, never errors.
fn derive_stats(stdout: &str) -> (usize, usize) {
    let collections_created = COLLECTION_CREATED_RE.find_iter(stdout).count();
    let items_processed = ITEMS_PROCESSED_RE.find_iter(stdout).count();
    (collections_created, items_processed)
}
