//! Durable session records
//!
//! Layout under the session root:
//!
//! ```text
//! terminal-sessions/<platform>/session_<YYYYMMDD>.json   JSON array of exchanges
//! automation-logs/server/<YYYYMMDD>.log                  JSON lines of server events
//! ```
//!
//! Writers to the same file are serialized; different platforms and days
//! proceed independently.

use crate::shell::{ExecutionResult, ShellVariant};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// One recorded command and its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub result: ExecutionResult,
}

/// One line of the server event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub data: serde_json::Value,
}

/// Append-only store for session logs and server events
#[derive(Debug)]
pub struct SessionStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionStore {
    /// Create the store and its directory layout
    ///
    /// # Errors
    /// Returns an error if the directories cannot be created
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        for variant in ShellVariant::ALL {
            let dir = root.join("terminal-sessions").join(variant.as_str());
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create session directory {}", dir.display()))?;
        }
        let events = root.join("automation-logs").join("server");
        std::fs::create_dir_all(&events)
            .with_context(|| format!("Failed to create event log directory {}", events.display()))?;

        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Daily session id, e.g. `session_20250101`
    #[must_use]
    pub fn session_id(date: NaiveDate) -> String {
        format!("session_{}", date.format("%Y%m%d"))
    }

    #[must_use]
    pub fn session_file(&self, platform: ShellVariant, date: NaiveDate) -> PathBuf {
        self.root
            .join("terminal-sessions")
            .join(platform.as_str())
            .join(format!("{}.json", Self::session_id(date)))
    }

    #[must_use]
    pub fn event_file(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join("automation-logs")
            .join("server")
            .join(format!("{}.log", date.format("%Y%m%d")))
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Record an exchange in today's session for `platform`
    ///
    /// # Errors
    /// Returns an error if the session file cannot be written
    pub async fn append(&self, platform: ShellVariant, command: &str, result: &ExecutionResult) -> Result<PathBuf> {
        let path = self.session_file(platform, Local::now().date_naive());
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        let mut entries = match fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str::<Vec<SessionEntry>>(&json).unwrap_or_else(|e| {
                warn!("Session file {} unreadable, starting over: {}", path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        entries.push(SessionEntry {
            timestamp: Utc::now(),
            command: command.to_string(),
            result: result.clone(),
        });

        let json = serde_json::to_string_pretty(&entries).context("Failed to serialize session")?;
        fs::write(&path, json).await.context("Failed to write session file")?;

        debug!("Saved exchange to {}", path.display());
        Ok(path)
    }

    /// Load the exchanges recorded for `platform` on `date`
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn load_day(&self, platform: ShellVariant, date: NaiveDate) -> Result<Vec<SessionEntry>> {
        let path = self.session_file(platform, date);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&path).await.context("Failed to read session file")?;
        let entries = serde_json::from_str(&json).context("Failed to parse session file")?;

        Ok(entries)
    }

    /// Session ids recorded for `platform`, most recent first
    ///
    /// # Errors
    /// Returns an error if the platform directory cannot be read
    pub async fn list_days(&self, platform: ShellVariant) -> Result<Vec<String>> {
        let dir = self.root.join("terminal-sessions").join(platform.as_str());
        let mut days = Vec::new();

        let mut entries = fs::read_dir(&dir).await.context("Failed to read session directory")?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    days.push(stem.to_string());
                }
            }
        }

        days.sort_by(|a, b| b.cmp(a));
        Ok(days)
    }

    /// Append an event to today's server event log
    ///
    /// # Errors
    /// Returns an error if the log file cannot be opened or written
    pub async fn log_event(&self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let path = self.event_file(Local::now().date_naive());
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        let record = EventRecord {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            data,
        };
        let mut line = serde_json::to_string(&record).context("Failed to serialize event")?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open event log")?;
        file.write_all(line.as_bytes()).await.context("Failed to write event log")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout_created() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        for variant in ShellVariant::ALL {
            assert!(store.root().join("terminal-sessions").join(variant.as_str()).is_dir());
        }
        assert!(store.root().join("automation-logs/server").is_dir());
    }

    #[test]
    fn test_session_id_format() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(SessionStore::session_id(date), "session_20250307");
    }

    #[tokio::test]
    async fn test_append_and_load() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let result = ExecutionResult::failure(ShellVariant::Linux, "boom");

        store.append(ShellVariant::Linux, "false", &result).await.unwrap();
        store.append(ShellVariant::Linux, "true", &result).await.unwrap();

        let today = Local::now().date_naive();
        let entries = store.load_day(ShellVariant::Linux, today).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].command, "false");
        assert_eq!(entries[1].result.error, "boom");

        let days = store.list_days(ShellVariant::Linux).await.unwrap();
        assert_eq!(days, vec![SessionStore::session_id(today)]);
        assert!(store.list_days(ShellVariant::Windows).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()).unwrap());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let result = ExecutionResult::failure(ShellVariant::MacOs, "x");
                    store.append(ShellVariant::MacOs, &format!("cmd {i}"), &result).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let entries = store.load_day(ShellVariant::MacOs, Local::now().date_naive()).await.unwrap();
        assert_eq!(entries.len(), 16);
    }

    #[tokio::test]
    async fn test_event_log_appends_lines() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        store.log_event("agent_registered", serde_json::json!({"platform": "linux"})).await.unwrap();
        store.log_event("agent_unregistered", serde_json::json!({"platform": "linux"})).await.unwrap();

        let contents = std::fs::read_to_string(store.event_file(Local::now().date_naive())).unwrap();
        let records: Vec<EventRecord> = contents.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event_type, "agent_unregistered");
    }
}
