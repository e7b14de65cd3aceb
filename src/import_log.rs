use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub category: String,
    pub message: String,
}

/// Status log of a single import run.
///
/// Clones share the same entries, so the converter, the CSS parser and the
/// downloader can all report into the log handed back to the caller. Every
/// entry is forwarded to `tracing` as well.
#[derive(Debug, Clone, Default)]
pub struct ImportLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ImportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, category: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(category, "{}", message);
        self.push(LogLevel::Info, category, message);
    }

    pub fn warn(&self, category: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(category, "{}", message);
        self.push(LogLevel::Warning, category, message);
    }

    pub fn error(&self, category: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(category, "{}", message);
        self.push(LogLevel::Error, category, message);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .count()
    }

    fn push(&self, level: LogLevel, category: &str, message: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                level,
                category: category.to_string(),
                message,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let log = ImportLog::new();
        let other = log.clone();

        log.info("css", "parsed main.css");
        other.error("url", "bad reference");

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[1].category, "url");
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn entries_serialize_with_lowercase_level() {
        let log = ImportLog::new();
        log.warn("download", "skipped");

        let json = serde_json::to_string(&log.entries()).unwrap();
        assert_eq!(
            json,
            r#"[{"level":"warning","category":"download","message":"skipped"}]"#
        );
    }
}
