use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs as async_fs, io::AsyncWriteExt, sync::Mutex};
use crate::models::errors::RelayError;

/// Size above which the log file is trimmed
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Lines kept after a trim
pub const DEFAULT_RETAIN_LINES: usize = 500;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Severity::Info),
            "success" => Some(Severity::Success),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    /// Parses a `[timestamp] [severity] message` line
    pub fn parse_line(line: &str) -> Option<Self> {
        let rest = line.strip_prefix('[')?;
        let (timestamp, rest) = rest.split_once("] [")?;
        let (severity, message) = rest.split_once("] ")?;

        Some(Self {
            timestamp: timestamp.to_string(),
            severity: Severity::parse(severity)?,
            message: message.to_string(),
        })
    }

    fn to_line(&self) -> String {
        format!("[{}] [{}] {}\n", self.timestamp, self.severity, self.message)
    }
}

/// Append-only operator log backed by a single file.
///
/// Once the file grows past `max_bytes` it is rewritten with only the newest
/// `retain_lines` lines. Appends and trims share one lock.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    max_bytes: u64,
    retain_lines: usize,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, RelayError> {
        Self::with_limits(path, DEFAULT_MAX_BYTES, DEFAULT_RETAIN_LINES)
    }

    pub fn with_limits(
        path: impl Into<PathBuf>,
        max_bytes: u64,
        retain_lines: usize,
    ) -> Result<Self, RelayError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RelayError::internal_error(format!("Failed to create log directory: {}", e))
                })?;
            }
        }

        Ok(Self {
            path,
            max_bytes,
            retain_lines,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an entry; failures are reported through tracing only
    pub async fn record(&self, message: impl Into<String>, severity: Severity) {
        let message = message.into();

        match severity {
            Severity::Error => tracing::warn!(target: "audit", "{}", message),
            _ => tracing::info!(target: "audit", severity = %severity, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            severity,
            // Newlines would split one entry into several lines
            message: message.replace(['\r', '\n'], " "),
        };

        if let Err(e) = self.append(&entry).await {
            tracing::error!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, entry: &LogEntry) -> std::io::Result<()> {
        let _guard = self.lock.lock().await;

        let mut file = async_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.to_line().as_bytes()).await?;
        file.flush().await?;
        drop(file);

        let size = async_fs::metadata(&self.path).await?.len();
        if size > self.max_bytes {
            self.trim().await?;
        }

        Ok(())
    }

    async fn trim(&self) -> std::io::Result<()> {
        let contents = async_fs::read_to_string(&self.path).await?;
        let lines: Vec<&str> = contents.lines().collect();
        let keep_from = lines.len().saturating_sub(self.retain_lines);

        let mut retained = lines[keep_from..].join("\n");
        if !retained.is_empty() {
            retained.push('\n');
        }

        async_fs::write(&self.path, retained).await?;
        tracing::debug!(
            "Trimmed audit log {} to {} lines",
            self.path.display(),
            lines.len() - keep_from
        );
        Ok(())
    }

    /// Most recent entries, newest first
    pub async fn read(&self, limit: usize) -> Result<Vec<LogEntry>, RelayError> {
        let _guard = self.lock.lock().await;

        let contents = match async_fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RelayError::internal_error(format!(
                    "Failed to read audit log: {}",
                    e
                )))
            }
        };

        Ok(contents
            .lines()
            .rev()
            .filter_map(LogEntry::parse_line)
            .take(limit)
            .collect())
    }

    /// Removes every entry
    pub async fn clear(&self) -> Result<(), RelayError> {
        let _guard = self.lock.lock().await;

        match async_fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RelayError::internal_error(format!(
                "Failed to clear audit log: {}",
                e
            ))),
        }
    }
}
