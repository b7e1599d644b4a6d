/// Per-run execution log
///
/// Every entry is retained for the run result; entries at or above the configured
/// minimum level are also mirrored to tracing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log severity, ordered debug < info < warn < error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(anyhow::anyhow!("Unknown log level: {}", other)),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// A single append-only log entry of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// Log list owned by a single run
#[derive(Debug)]
pub struct ExecutionLogger {
    run_id: String,
    min_level: LogLevel,
    entries: Vec<ExecutionLog>,
}

impl ExecutionLogger {
    pub fn new(run_id: impl Into<String>, min_level: LogLevel) -> Self {
        Self {
            run_id: run_id.into(),
            min_level,
            entries: Vec::new(),
        }
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, node_id: Option<&str>) {
        let message = message.into();

        if level >= self.min_level {
            let node = node_id.unwrap_or("-");
            match level {
                LogLevel::Debug => tracing::debug!(run_id = %self.run_id, node_id = node, "{}", message),
                LogLevel::Info => tracing::info!(run_id = %self.run_id, node_id = node, "{}", message),
                LogLevel::Warn => tracing::warn!(run_id = %self.run_id, node_id = node, "{}", message),
                LogLevel::Error => tracing::error!(run_id = %self.run_id, node_id = node, "{}", message),
            }
        }

        self.entries.push(ExecutionLog {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            level,
            message,
            node_id: node_id.map(str::to_string),
        });
    }

    pub fn debug(&mut self, message: impl Into<String>, node_id: Option<&str>) {
        self.log(LogLevel::Debug, message, node_id);
    }

    pub fn info(&mut self, message: impl Into<String>, node_id: Option<&str>) {
        self.log(LogLevel::Info, message, node_id);
    }

    pub fn warn(&mut self, message: impl Into<String>, node_id: Option<&str>) {
        self.log(LogLevel::Warn, message, node_id);
    }

    pub fn error(&mut self, message: impl Into<String>, node_id: Option<&str>) {
        self.log(LogLevel::Error, message, node_id);
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn entries(&self) -> &[ExecutionLog] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ExecutionLog> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_filtered_entries_are_still_retained() {
        let mut logger = ExecutionLogger::new("run-1", LogLevel::Error);
        logger.debug("quiet", None);
        logger.warn("careful", Some("n1"));
        logger.error("boom", Some("n1"));

        assert_eq!(logger.entries().len(), 3);
        assert_eq!(logger.count(LogLevel::Warn), 1);
        assert_eq!(logger.entries()[1].node_id.as_deref(), Some("n1"));
        assert!(logger.entries().iter().all(|e| e.run_id == "run-1"));
    }
}
