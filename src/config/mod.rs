mod file_config;

pub use file_config::{FileConfig, WorkerConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub recent_logs_count: usize,
    pub worker_path: Option<PathBuf>,
    pub worker_interpreter: Option<String>,
    pub worker_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the configuration document and the run log.
    pub data_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub recent_logs_count: usize,

    // Worker settings
    pub worker_path: PathBuf,
    pub worker_interpreter: Option<String>,
    pub worker_timeout_sec: u64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified on the command line or in config file")
            })?;

        if !data_dir.exists() {
            bail!("Data directory does not exist: {:?}", data_dir);
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let recent_logs_count = file.recent_logs_count.unwrap_or(cli.recent_logs_count);

        let worker_file = file.worker.unwrap_or_default();
        let worker_path = worker_file
            .path
            .map(PathBuf::from)
            .or_else(|| cli.worker_path.clone())
            .unwrap_or_else(|| PathBuf::from("scripts/jellyfin_kometa.py"));
        let worker_interpreter = worker_file
            .interpreter
            .or_else(|| cli.worker_interpreter.clone());
        let worker_timeout_sec = worker_file.timeout_sec.unwrap_or(cli.worker_timeout_sec);

        if worker_timeout_sec == 0 {
            bail!("worker timeout must be positive");
        }

        Ok(Self {
            data_dir,
            port,
            logging_level,
            frontend_dir_path,
            recent_logs_count,
            worker_path,
            worker_interpreter,
            worker_timeout_sec,
        })
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir.join("config.yml")
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.data_dir.join("kometa.log")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
