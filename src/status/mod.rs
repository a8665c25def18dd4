//! Dashboard snapshot aggregation.
//!
//! Combines Jellyfin library statistics, the most recent run log entries and
//! a connectivity flag into one read-only view. Always degrades gracefully:
//! a snapshot is produced even when every collaborator fails.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::jellyfin::{JellyfinApi, LibraryStats};
use crate::run_log::{LogEntry, LogLevel, RunLog};

/// UI-facing shape of one recent log entry.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl From<LogEntry> for RecentLogEntry {
    fn from(entry: LogEntry) -> Self {
        RecentLogEntry {
            timestamp: entry.timestamp,
            level: entry.level,
            message: entry.message,
            library: entry.library,
            collection: entry.collection,
        }
    }
}

/// Aggregated dashboard view.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub libraries: Vec<LibraryStats>,
    pub recent_logs: Vec<RecentLogEntry>,
    pub jellyfin_connected: bool,
}

/// Read-only aggregator over the run log and the media server.
pub struct StatusReporter {
    jellyfin: Arc<dyn JellyfinApi>,
    run_log: Arc<RunLog>,
    recent_logs_count: usize,
}

impl StatusReporter {
    pub fn new(
        jellyfin: Arc<dyn JellyfinApi>,
        run_log: Arc<RunLog>,
        recent_logs_count: usize,
    ) -> Self {
        StatusReporter {
            jellyfin,
            run_log,
            recent_logs_count,
        }
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        let jellyfin_connected = self.jellyfin.check_connection().await.is_ok();

        let libraries = match self.jellyfin.list_library_stats().await {
            Ok(libraries) => libraries,
            Err(err) => {
                warn!("Failed to list library stats: {}", err);
                Vec::new()
            }
        };

        let recent_logs = match self.run_log.read_recent(self.recent_logs_count) {
            Ok(entries) => entries.into_iter().map(RecentLogEntry::from).collect(),
            Err(err) => {
                warn!("Failed to read recent log entries: {}", err);
                Vec::new()
            }
        };

        DashboardSnapshot {
            libraries,
            recent_logs,
            jellyfin_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jellyfin::{LibraryStatus, UpstreamError};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FakeJellyfin {
        connected: bool,
        stats: Option<Vec<LibraryStats>>,
    }

    #[async_trait]
    impl JellyfinApi for FakeJellyfin {
        async fn check_connection(&self) -> Result<(), UpstreamError> {
            if self.connected {
                Ok(())
            } else {
                Err(UpstreamError::NoUsers)
            }
        }

        async fn list_library_stats(&self) -> Result<Vec<LibraryStats>, UpstreamError> {
            match &self.stats {
                Some(stats) => Ok(stats.clone()),
                None => Err(UpstreamError::NoUsers),
            }
        }
    }

    fn make_run_log(dir: &TempDir) -> Arc<RunLog> {
        Arc::new(RunLog::new(dir.path().join("kometa.log")))
    }

    #[tokio::test]
    async fn test_snapshot_with_healthy_upstream() {
        let dir = TempDir::new().unwrap();
        let run_log = make_run_log(&dir);
        run_log
            .append(LogLevel::Success, r#"Collection "Films Marvel" créée"#)
            .unwrap();

        let jellyfin = Arc::new(FakeJellyfin {
            connected: true,
            stats: Some(vec![LibraryStats {
                name: "Films".to_string(),
                total_items: 42,
                collection_count: 3,
                status: LibraryStatus::Success,
            }]),
        });

        let reporter = StatusReporter::new(jellyfin, run_log, 10);
        let snapshot = reporter.snapshot().await;

        assert!(snapshot.jellyfin_connected);
        assert_eq!(snapshot.libraries.len(), 1);
        assert_eq!(snapshot.libraries[0].total_items, 42);
        assert_eq!(snapshot.recent_logs.len(), 1);
        assert_eq!(
            snapshot.recent_logs[0].collection.as_deref(),
            Some("Films Marvel")
        );
    }

    #[tokio::test]
    async fn test_snapshot_degrades_on_upstream_failure() {
        let dir = TempDir::new().unwrap();
        let run_log = make_run_log(&dir);

        let jellyfin = Arc::new(FakeJellyfin {
            connected: false,
            stats: None,
        });

        let reporter = StatusReporter::new(jellyfin, run_log, 10);
        let snapshot = reporter.snapshot().await;

        assert!(!snapshot.jellyfin_connected);
        assert!(snapshot.libraries.is_empty());
        assert!(snapshot.recent_logs.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_caps_recent_logs() {
        let dir = TempDir::new().unwrap();
        let run_log = make_run_log(&dir);
        for i in 0..15 {
            run_log
                .append(LogLevel::Info, &format!("entry {}", i))
                .unwrap();
        }

        let jellyfin = Arc::new(FakeJellyfin {
            connected: true,
            stats: Some(Vec::new()),
        });

        let reporter = StatusReporter::new(jellyfin, run_log, 10);
        let snapshot = reporter.snapshot().await;

        assert_eq!(snapshot.recent_logs.len(), 10);
        // Most recent first.
        assert_eq!(snapshot.recent_logs[0].message, "entry 14");
    }
}
