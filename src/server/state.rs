use axum::extract::FromRef;

use crate::config_store::ConfigStore;
use crate::jellyfin::JellyfinApi;
use crate::run_log::RunLog;
use crate::status::StatusReporter;
use crate::supervisor::ProcessSupervisor;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedConfigStore = Arc<ConfigStore>;
pub type GuardedRunLog = Arc<RunLog>;
pub type GuardedSupervisor = Arc<ProcessSupervisor>;
pub type GuardedJellyfin = Arc<dyn JellyfinApi>;
pub type GuardedStatusReporter = Arc<StatusReporter>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub config_store: GuardedConfigStore,
    pub run_log: GuardedRunLog,
    pub supervisor: GuardedSupervisor,
    pub jellyfin: GuardedJellyfin,
    pub status_reporter: GuardedStatusReporter,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedConfigStore {
    fn from_ref(input: &ServerState) -> Self {
        input.config_store.clone()
    }
}

impl FromRef<ServerState> for GuardedRunLog {
    fn from_ref(input: &ServerState) -> Self {
        input.run_log.clone()
    }
}

impl FromRef<ServerState> for GuardedSupervisor {
    fn from_ref(input: &ServerState) -> Self {
        input.supervisor.clone()
    }
}

impl FromRef<ServerState> for GuardedJellyfin {
    fn from_ref(input: &ServerState) -> Self {
        input.jellyfin.clone()
    }
}

impl FromRef<ServerState> for GuardedStatusReporter {
    fn from_ref(input: &ServerState) -> Self {
        input.status_reporter.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
