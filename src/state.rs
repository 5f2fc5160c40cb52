//! Internal state file for backoff and rate-limit bookkeeping.
//!
//! INI file with a single `[internal]` section:
//!
//! ```ini
//! [internal]
//! backoff_at = 2026-03-01T10:00:00+00:00
//! backoff_retries = 2
//! heartbeats_last_sent_at = 2026-03-01T09:58:00+00:00
//! ```
//!
//! Writes happen under a best-effort lock file: failure to acquire it only
//! logs and proceeds, since losing a bookkeeping update is preferable to
//! blocking a heartbeat.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use ini::Ini;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;

const INTERNAL_SECTION: &str = "internal";

/// How long to wait for the lock file before proceeding without it.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
/// Lock files older than this are considered stale and removed.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);

/// Parsed `[internal]` section values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InternalState {
    pub backoff_at: Option<DateTime<Utc>>,
    pub backoff_retries: u32,
    pub heartbeats_last_sent_at: Option<DateTime<Utc>>,
}

/// Handle on the internal config file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the internal state; a missing file yields defaults.
    pub fn load(&self) -> Result<InternalState, Error> {
        if !self.path.exists() {
            return Ok(InternalState::default());
        }

        let file = Ini::load_from_file(&self.path)
            .map_err(|err| Error::ConfigFileRead(err.to_string()))?;

        let section = file.section(Some(INTERNAL_SECTION));

        let mut state = InternalState::default();

        if let Some(section) = section {
            state.backoff_at = section.get("backoff_at").and_then(parse_timestamp);
            state.backoff_retries = section
                .get("backoff_retries")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            state.heartbeats_last_sent_at = section
                .get("heartbeats_last_sent_at")
                .and_then(parse_timestamp);
        }

        Ok(state)
    }

    /// Write key/value pairs into the `[internal]` section, keeping other
    /// keys intact. Empty values delete the key.
    pub fn write(&self, entries: &[(&str, String)]) -> Result<(), Error> {
        let _lock = LockGuard::acquire(&self.path);

        let mut file = if self.path.exists() {
            Ini::load_from_file(&self.path).map_err(|err| Error::ConfigFileRead(err.to_string()))?
        } else {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| Error::ConfigFileWrite(err.to_string()))?;
            }
            Ini::new()
        };

        for (key, value) in entries {
            if value.is_empty() {
                file.delete_from(Some(INTERNAL_SECTION), key);
            } else {
                file.with_section(Some(INTERNAL_SECTION)).set(*key, value);
            }
        }

        file.write_to_file(&self.path)
            .map_err(|err| Error::ConfigFileWrite(err.to_string()))
    }
}

/// Format a timestamp the way the internal config stores it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            debug!("failed to parse timestamp {trimmed:?}: {err}");
            None
        }
    }
}

/// Metadata stored in a lock file to identify the owning process.
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    started: String,
}

/// Best-effort file lock guarding internal config writes.
struct LockGuard {
    lock_path: Option<PathBuf>,
}

impl LockGuard {
    fn acquire(path: &Path) -> Self {
        let lock_path = lock_path_for(path);
        let deadline = Instant::now() + LOCK_TIMEOUT;

        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        started: Utc::now().to_rfc3339(),
                    };
                    if let Err(err) = serde_json::to_writer(file, &info) {
                        debug!("failed to write lock info: {err}");
                    }

                    return Self {
                        lock_path: Some(lock_path),
                    };
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    remove_if_stale(&lock_path);

                    if Instant::now() >= deadline {
                        warn!(
                            "timed out acquiring internal config lock {:?}; writing anyway",
                            lock_path
                        );
                        return Self { lock_path: None };
                    }

                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(err) => {
                    debug!("failed to create lock file {lock_path:?}: {err}");
                    return Self { lock_path: None };
                }
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(lock_path) = &self.lock_path {
            let _ = std::fs::remove_file(lock_path);
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

fn remove_if_stale(lock_path: &Path) {
    let Ok(metadata) = std::fs::metadata(lock_path) else {
        return;
    };

    let stale = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > LOCK_STALE_AFTER)
        .unwrap_or(false);

    if stale {
        debug!("removing stale lock file {lock_path:?}");
        let _ = std::fs::remove_file(lock_path);
    }
}
