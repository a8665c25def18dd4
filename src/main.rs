use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
use config::{AppConfig, CliConfig, FileConfig};

mod config_store;
use config_store::ConfigStore;

mod jellyfin;
use jellyfin::{JellyfinApi, JellyfinClient};

mod run_log;
use run_log::RunLog;

mod server;
use server::{run_server, RequestsLoggingLevel, ServerConfig};

mod status;
use status::StatusReporter;

mod storage;

mod supervisor;
use supervisor::{ProcessSupervisor, WorkerSpec};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the configuration document and the run log.
    #[clap(value_parser = parse_path)]
    pub data_dir: PathBuf,

    /// Path to an optional TOML config file (overrides CLI values).
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Path to the Kometa worker entry point.
    #[clap(long, value_parser = parse_path)]
    pub worker_path: Option<PathBuf>,

    /// Interpreter for the worker entry point (defaults to python3 for .py).
    #[clap(long)]
    pub worker_interpreter: Option<String>,

    /// Hard timeout in seconds for a single worker run.
    #[clap(long, default_value_t = 300)]
    pub worker_timeout_sec: u64,

    /// Number of recent log entries shown on the dashboard.
    #[clap(long, default_value_t = 10)]
    pub recent_logs_count: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;

    let cli_config = CliConfig {
        data_dir: Some(cli_args.data_dir),
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        frontend_dir_path: cli_args.frontend_dir_path,
        recent_logs_count: cli_args.recent_logs_count,
        worker_path: cli_args.worker_path,
        worker_interpreter: cli_args.worker_interpreter,
        worker_timeout_sec: cli_args.worker_timeout_sec,
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Loading configuration from {:?}...", app_config.config_file_path());
    let config_store = Arc::new(ConfigStore::new(app_config.config_file_path()));
    let configuration = config_store.load()?;

    let run_log = Arc::new(RunLog::with_vocabulary(
        app_config.run_log_path(),
        configuration.libraries.keys().cloned().collect(),
    ));

    let worker = WorkerSpec::resolve(
        app_config.worker_path.clone(),
        app_config.worker_interpreter.clone(),
    );
    info!("Worker entry point: {:?}", worker.entry_point);
    let supervisor = Arc::new(
        ProcessSupervisor::new(
            worker,
            config_store.path().to_path_buf(),
            run_log.clone(),
        )
        .with_timeout(Duration::from_secs(app_config.worker_timeout_sec)),
    );

    // Connection parameters are read once at startup; editing them through
    // the dashboard takes effect on restart.
    let jellyfin: Arc<dyn JellyfinApi> = Arc::new(JellyfinClient::new(
        configuration.connection.url.clone(),
        configuration.connection.api_key.clone(),
        10,
    ));

    let status_reporter = Arc::new(StatusReporter::new(
        jellyfin.clone(),
        run_log.clone(),
        app_config.recent_logs_count,
    ));

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
    };

    info!("Ready to serve at port {}!", server_config.port);
    run_server(
        server_config,
        config_store,
        run_log,
        supervisor,
        jellyfin,
        status_reporter,
        env!("GIT_HASH").to_string(),
    )
    .await
}
