use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::error;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::services::ServeDir;

use crate::config_store::Configuration;
use crate::jellyfin::JellyfinClient;
use crate::storage::StorageError;
use crate::supervisor::{ExecutionError, RunOutcome, RunRecord};

use super::{log_requests, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    success: bool,
    message: String,
    outcome: RunOutcome,
    collections_created: usize,
    items_processed: usize,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl From<RunRecord> for ExecuteResponse {
    fn from(record: RunRecord) -> Self {
        let success = record.outcome == RunOutcome::Success;
        let message = if success {
            "Script exécuté avec succès".to_string()
        } else {
            "Erreur lors de l'exécution du script".to_string()
        };
        ExecuteResponse {
            success,
            message,
            outcome: record.outcome,
            collections_created: record.collections_created,
            items_processed: record.items_processed,
            exit_code: record.exit_code,
            stdout: record.stdout,
            stderr: record.stderr,
        }
    }
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

async fn get_config(State(config_store): State<GuardedConfigStore>) -> Response {
    match config_store.load() {
        Ok(config) => Json(config).into_response(),
        Err(err) => {
            error!("Failed to load configuration: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn save_config(
    State(config_store): State<GuardedConfigStore>,
    Json(config): Json<Configuration>,
) -> Response {
    match config_store.save(&config) {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err @ StorageError::InvalidConfiguration(_)) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            error!("Failed to save configuration: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn execute_script(State(state): State<ServerState>) -> Response {
    let config = match state.config_store.load() {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load configuration for execution: {}", err);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    };

    match state.supervisor.execute(&config).await {
        Ok(record) => Json(ExecuteResponse::from(record)).into_response(),
        Err(ExecutionError::Busy) => error_response(
            StatusCode::CONFLICT,
            "Une exécution est déjà en cours",
        ),
        Err(err @ ExecutionError::WorkerNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(ExecutionError::Timeout {
            timeout_secs,
            stdout,
            stderr,
        }) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({
                "error": format!("Script interrompu après {}s", timeout_secs),
                "stdout": stdout,
                "stderr": stderr,
            })),
        )
            .into_response(),
        Err(err) => {
            error!("Worker execution failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn get_logs(State(run_log): State<GuardedRunLog>) -> Response {
    match run_log.read_all() {
        Ok(mut entries) => {
            // Most recent first for display.
            entries.reverse();
            Json(json!({ "logs": entries })).into_response()
        }
        Err(err) => {
            error!("Failed to read run log: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn get_dashboard(State(reporter): State<GuardedStatusReporter>) -> Response {
    Json(reporter.snapshot().await).into_response()
}

async fn get_health(State(jellyfin): State<GuardedJellyfin>) -> Response {
    let jellyfin_status = match jellyfin.check_connection().await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "jellyfin": jellyfin_status,
            "api": "healthy",
        },
    }))
    .into_response()
}

async fn get_jellyfin_test(State(jellyfin): State<GuardedJellyfin>) -> Response {
    let connected = jellyfin.check_connection().await.is_ok();
    Json(json!({ "connected": connected })).into_response()
}

#[derive(Deserialize, Debug)]
struct JellyfinTestBody {
    pub url: String,
    pub api_key: String,
}

async fn post_jellyfin_test(Json(body): Json<JellyfinTestBody>) -> Response {
    if body.url.is_empty() || body.api_key.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "URL et clé API requis");
    }

    use crate::jellyfin::JellyfinApi;
    let client = JellyfinClient::new(body.url, body.api_key, 5);
    let connected = client.check_connection().await.is_ok();
    Json(json!({ "connected": connected })).into_response()
}

fn make_app(
    config: ServerConfig,
    config_store: GuardedConfigStore,
    run_log: GuardedRunLog,
    supervisor: GuardedSupervisor,
    jellyfin: GuardedJellyfin,
    status_reporter: GuardedStatusReporter,
    hash: String,
) -> Router {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        config_store,
        run_log,
        supervisor,
        jellyfin,
        status_reporter,
        hash,
    };

    let api_routes: Router = Router::new()
        .route("/config", get(get_config))
        .route("/config", post(save_config))
        .route("/dashboard", get(get_dashboard))
        .route("/execute", post(execute_script))
        .route("/logs", get(get_logs))
        .route("/health", get(get_health))
        .route("/jellyfin/test", get(get_jellyfin_test))
        .route("/jellyfin/test", post(post_jellyfin_test))
        .with_state(state.clone());

    let home_router: Router = match &config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router
        .nest("/v1", api_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

#[allow(clippy::too_many_arguments)]
pub async fn run_server(
    config: ServerConfig,
    config_store: GuardedConfigStore,
    run_log: GuardedRunLog,
    supervisor: GuardedSupervisor,
    jellyfin: GuardedJellyfin,
    status_reporter: GuardedStatusReporter,
    hash: String,
) -> Result<()> {
    let port = config.port;
    let app = make_app(
        config,
        config_store,
        run_log,
        supervisor,
        jellyfin,
        status_reporter,
        hash,
    );

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}
