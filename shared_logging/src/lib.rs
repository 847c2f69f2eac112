#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared across the driver crates.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug detail.
    Debug,
    /// Informational events.
    Info,
    /// Recoverable problems (failed attempts, missing columns).
    Warn,
    /// Failures surfaced to the operator.
    Error,
}

/// One structured record in the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the record was produced.
    pub at: DateTime<Utc>,
    /// Component that produced it (e.g. `driver.submit`).
    pub component: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Structured detail fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with no detail fields.
    #[must_use]
    pub fn new(component: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            component: component.into(),
            level,
            message: message.into(),
            detail: serde_json::Map::new(),
        }
    }

    /// Attaches a JSON object as detail fields; non-objects are ignored.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = detail {
            self.detail = map;
        }
        self
    }
}

/// Append-only JSON-lines logger.
///
/// Warnings and errors are additionally echoed to stderr so an interactive
/// run surfaces problems without tailing the log file.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
    echo: bool,
}

impl JsonLogger {
    /// Creates or opens a log file, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
            echo: true,
        })
    }

    /// Disables the stderr echo of warning/error records.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Appends one record as a JSON line.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if self.echo && record.level >= LogLevel::Warn {
            eprintln!("[{:?}] {}: {}", record.level, record.component, record.message);
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Path of the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::open(dir.path().join("run.log")).unwrap().quiet();
        logger
            .log(&LogRecord::new("driver.submit", LogLevel::Warn, "attempt failed"))
            .unwrap();
        logger
            .log(
                &LogRecord::new("driver.submit", LogLevel::Info, "accepted")
                    .with_detail(serde_json::json!({ "attempts": 2 })),
            )
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"attempt failed\""));
        assert!(lines[1].contains("\"attempts\":2"));
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Warn > LogLevel::Info);
    }
}
