//! Activity logging: JSONL event stream plus bracketed stderr warnings.

#![allow(missing_docs)]

pub mod jsonl;

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::config::LoggingConfig;
use crate::logger::jsonl::{JsonlConfig, JsonlWriter, LogEntry};

struct Inner {
    writer: JsonlWriter,
    sync_interval: Duration,
    last_sync: Instant,
}

/// Shared handle the session logs through from `&self`.
///
/// A disabled log drops every entry; logging never fails an operation.
pub struct ActivityLog {
    inner: Option<Mutex<Inner>>,
}

impl ActivityLog {
    /// Log that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Open a JSONL-backed log. `sync_interval` of zero syncs after every entry.
    #[must_use]
    pub fn open(config: JsonlConfig, sync_interval: Duration) -> Self {
        Self {
            inner: Some(Mutex::new(Inner {
                writer: JsonlWriter::open(config),
                sync_interval,
                last_sync: Instant::now(),
            })),
        }
    }

    /// Build from the `[logging]` config section and the resolved log path.
    #[must_use]
    pub fn from_config(logging: &LoggingConfig, path: &std::path::Path) -> Self {
        if !logging.enabled {
            return Self::disabled();
        }
        Self::open(
            JsonlConfig {
                path: path.to_path_buf(),
                fallback_path: logging.fallback_path.clone(),
                max_size_bytes: logging.max_size_bytes,
                max_rotated_files: logging.max_rotated_files,
            },
            Duration::from_secs(logging.fsync_interval_secs),
        )
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn record(&self, entry: &LogEntry) {
        let Some(inner) = &self.inner else {
            return;
        };
        let mut inner = inner.lock();
        inner.writer.write_entry(entry);
        if inner.last_sync.elapsed() >= inner.sync_interval {
            inner.writer.sync();
            inner.last_sync = Instant::now();
        } else {
            inner.writer.flush();
        }
    }

    /// Current JSONL sink, or `disabled`.
    #[must_use]
    pub fn state(&self) -> &'static str {
        self.inner
            .as_ref()
            .map_or("disabled", |inner| inner.lock().writer.state())
    }
}

/// Operational warning on stderr, e.g. `[NETPOL-SESSION] ...`.
pub fn warn(component: &str, message: &str) {
    eprintln!("[NETPOL-{component}] {message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::jsonl::{EventType, Severity};

    #[test]
    fn disabled_log_drops_entries() {
        let log = ActivityLog::disabled();
        log.record(&LogEntry::new(EventType::SessionStart, Severity::Info));
        assert!(!log.is_enabled());
        assert_eq!(log.state(), "disabled");
    }

    #[test]
    fn enabled_log_writes_each_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let log = ActivityLog::open(
            JsonlConfig {
                path: path.clone(),
                fallback_path: None,
                max_size_bytes: 1 << 20,
                max_rotated_files: 2,
            },
            Duration::from_secs(60),
        );
        log.record(&LogEntry::new(EventType::SessionStart, Severity::Info));
        log.record(&LogEntry::new(EventType::ExpansionChanged, Severity::Info).package("a.b"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(log.state(), "primary");
    }

    #[test]
    fn disabled_config_builds_disabled_log() {
        let logging = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        let log = ActivityLog::from_config(&logging, std::path::Path::new("/unused.jsonl"));
        assert!(!log.is_enabled());
    }
}
