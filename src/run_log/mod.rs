//! Append-only run log.
//!
//! One line per event, shaped `[<RFC 3339 timestamp>] <LEVEL>: <message>`.
//! The supervisor appends SUCCESS/ERROR entries after each worker run; the
//! worker itself writes to the same file with the same shape. Reads never
//! fail on content: a line that does not match the shape degrades to an INFO
//! entry carrying the raw line.

use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::storage::StorageError;

lazy_static! {
    static ref LINE_RE: Regex =
        Regex::new(r"^\[([^\]]+)\] ([A-Za-z]+): (.*)$").unwrap();
    static ref COLLECTION_RE: Regex = Regex::new(r#"(?i)collection\s+"([^"]+)""#).unwrap();
}

/// Library names matched against entry messages when no configured names are
/// available yet.
const DEFAULT_LIBRARY_VOCABULARY: &[&str] = &["Films", "Séries TV", "Documentaires"];

/// Severity of a log entry. The writer only emits `Success` and `Error`;
/// the remaining levels show up in lines written by the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Success,
    Error,
    Info,
    Warning,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Success => "SUCCESS",
            LogLevel::Error => "ERROR",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Debug => "DEBUG",
        }
    }

    fn parse(s: &str) -> Option<LogLevel> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Some(LogLevel::Success),
            "ERROR" => Some(LogLevel::Error),
            "INFO" => Some(LogLevel::Info),
            "WARNING" => Some(LogLevel::Warning),
            "DEBUG" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

/// One parsed log line, with the heuristic library/collection attribution
/// derived on read.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Library name found in the message, if any.
    pub library: Option<String>,
    /// Quoted collection name following the word "collection", if any.
    pub collection: Option<String>,
}

/// Owner of the append-only log file. The supervisor writes, the status
/// reporter reads. Appends are serialized on the interior lock; each append
/// is a single atomic line write.
pub struct RunLog {
    path: PathBuf,
    vocabulary: Vec<String>,
    append_lock: Mutex<()>,
}

impl RunLog {
    pub fn new(path: PathBuf) -> Self {
        Self::with_vocabulary(
            path,
            DEFAULT_LIBRARY_VOCABULARY
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    /// Use the configured library names for library attribution on read.
    pub fn with_vocabulary(path: PathBuf, mut vocabulary: Vec<String>) -> Self {
        if vocabulary.is_empty() {
            vocabulary = DEFAULT_LIBRARY_VOCABULARY
                .iter()
                .map(|s| s.to_string())
                .collect();
        }
        RunLog {
            path,
            vocabulary,
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Pure append, never truncates; creates the parent
    /// directory if absent.
    pub fn append(&self, level: LogLevel, message: &str) -> Result<(), StorageError> {
        // Newlines would break the one-line-per-entry shape.
        let message = message.replace(['\n', '\r'], " ");
        let line = format!(
            "[{}] {}: {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            level.as_str(),
            message
        );

        let _guard = self.append_lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| StorageError::Write {
                path: self.path.clone(),
                source: err,
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| StorageError::Write {
                path: self.path.clone(),
                source: err,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|err| StorageError::Write {
                path: self.path.clone(),
                source: err,
            })
    }

    /// All entries, oldest first. A missing file is an empty log.
    pub fn read_all(&self) -> Result<Vec<LogEntry>, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source: err,
                })
            }
        };

        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| self.parse_line(line))
            .collect())
    }

    /// Last `n` entries, most recent first.
    pub fn read_recent(&self, n: usize) -> Result<Vec<LogEntry>, StorageError> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(n);
        Ok(entries)
    }

    fn parse_line(&self, line: &str) -> LogEntry {
        if let Some(captures) = LINE_RE.captures(line) {
            let timestamp = DateTime::parse_from_rfc3339(&captures[1])
                .map(|t| t.with_timezone(&Utc));
            let level = LogLevel::parse(&captures[2]);
            if let (Ok(timestamp), Some(level)) = (timestamp, level) {
                let message = captures[3].to_string();
                return LogEntry {
                    timestamp,
                    level,
                    library: self.infer_library(&message),
                    collection: infer_collection(&message),
                    message,
                };
            }
        }

        // Malformed line: keep it, best effort.
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            library: self.infer_library(line),
            collection: infer_collection(line),
            message: line.to_string(),
        }
    }

    fn infer_library(&self, message: &str) -> Option<String> {
        self.vocabulary
            .iter()
            .find(|name| message.contains(name.as_str()))
            .cloned()
    }
}

fn infer_collection(message: &str) -> Option<String> {
    COLLECTION_RE
        .captures(message)
        .map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_log() -> (TempDir, RunLog) {
        let dir = TempDir::new().unwrap();
        let log = RunLog::new(dir.path().join("kometa.log"));
        (dir, log)
    }

    #[test]
    fn test_empty_log_reads_empty() {
        let (_dir, log) = make_log();
        assert!(log.read_all().unwrap().is_empty());
        assert!(log.read_recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_append_preserves_order() {
        let (_dir, log) = make_log();
        log.append(LogLevel::Success, "first").unwrap();
        log.append(LogLevel::Error, "second").unwrap();
        log.append(LogLevel::Success, "third").unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[0].level, LogLevel::Success);
        assert_eq!(entries[1].message, "second");
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(entries[2].message, "third");
    }

    #[test]
    fn test_read_recent_reverses() {
        let (_dir, log) = make_log();
        log.append(LogLevel::Info, "old").unwrap();
        log.append(LogLevel::Info, "newer").unwrap();
        log.append(LogLevel::Info, "newest").unwrap();

        let entries = log.read_recent(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "newest");
        assert_eq!(entries[1].message, "newer");
    }

    #[test]
    fn test_malformed_line_degrades_to_info() {
        let (dir, log) = make_log();
        log.append(LogLevel::Success, "well formed").unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(dir.path().join("kometa.log"))
                .unwrap();
            writeln!(file, "random garbage without shape").unwrap();
        }
        log.append(LogLevel::Error, "also well formed").unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].level, LogLevel::Info);
        assert_eq!(entries[1].message, "random garbage without shape");
    }

    #[test]
    fn test_append_does_not_truncate() {
        let (_dir, log) = make_log();
        log.append(LogLevel::Info, "one").unwrap();
        drop(log.read_all().unwrap());
        let log2 = RunLog::new(log.path().to_path_buf());
        log2.append(LogLevel::Info, "two").unwrap();
        assert_eq!(log2.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_multiline_message_is_flattened() {
        let (_dir, log) = make_log();
        log.append(LogLevel::Error, "line one\nline two").unwrap();
        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "line one line two");
    }

    #[test]
    fn test_infers_library_and_collection() {
        let (_dir, log) = make_log();
        log.append(
            LogLevel::Success,
            r#"Collection "Films Marvel" créée dans Films"#,
        )
        .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries[0].library.as_deref(), Some("Films"));
        assert_eq!(entries[0].collection.as_deref(), Some("Films Marvel"));
    }

    #[test]
    fn test_no_inference_match_yields_none() {
        let (_dir, log) = make_log();
        log.append(LogLevel::Info, "nothing recognizable here").unwrap();

        let entries = log.read_all().unwrap();
        assert!(entries[0].library.is_none());
        assert!(entries[0].collection.is_none());
    }

    #[test]
    fn test_custom_vocabulary() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::with_vocabulary(
            dir.path().join("kometa.log"),
            vec!["Anime".to_string()],
        );
        log.append(LogLevel::Info, "Scan de la bibliothèque Anime")
            .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries[0].library.as_deref(), Some("Anime"));
    }

    #[test]
    fn test_worker_written_levels_are_recognized() {
        let (dir, log) = make_log();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.path().join("kometa.log"))
                .unwrap();
            writeln!(file, "[2024-01-15T14:30:10Z] WARNING: poster manquant").unwrap();
            writeln!(file, "[2024-01-15T14:30:11Z] DEBUG: requête envoyée").unwrap();
        }

        let entries = log.read_all().unwrap();
        assert_eq!(entries[0].level, LogLevel::Warning);
        assert_eq!(entries[1].level, LogLevel::Debug);
    }
}
