//! Progress sink receiving every progress message of a run

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::Level;

/// Stage of a run a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Export,
    Prepare,
    Commit,
    Deferred,
    Deactivation,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Export => "Export",
            Phase::Prepare => "Prepare",
            Phase::Commit => "Import",
            Phase::Deferred => "Import (references)",
            Phase::Deactivation => "Import (deactivation)",
        }
    }
}

/// One structured progress message
#[derive(Debug, Clone)]
pub struct ProgressEntry {
    pub timestamp: DateTime<Local>,
    pub phase: Phase,
    pub level: Level,
    pub message: String,
}

impl ProgressEntry {
    pub fn new(phase: Phase, level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            phase,
            level,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProgressEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.phase.label(),
            self.message
        )
    }
}

/// Receiver of progress messages
pub trait ProgressSink: Send + Sync {
    fn record(&self, entry: ProgressEntry);

    fn info(&self, phase: Phase, message: String) {
        self.record(ProgressEntry::new(phase, Level::Info, message));
    }

    fn warn(&self, phase: Phase, message: String) {
        self.record(ProgressEntry::new(phase, Level::Warn, message));
    }

    fn error(&self, phase: Phase, message: String) {
        self.record(ProgressEntry::new(phase, Level::Error, message));
    }
}

/// Sink forwarding to the `log` facade and keeping a transcript for the run log file
#[derive(Debug, Default)]
pub struct LogSink {
    transcript: Mutex<Vec<ProgressEntry>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages recorded so far
    pub fn len(&self) -> usize {
        self.transcript.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the transcript, one message per line
    pub fn save(&self, path: &Path) -> Result<()> {
        let lines: Vec<String> = match self.transcript.lock() {
            Ok(transcript) => transcript.iter().map(|e| e.to_string()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|e| e.to_string()).collect(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write log file {}", path.display()))?;

        log::info!("Saved run log to {}", path.display());
        Ok(())
    }
}

impl ProgressSink for LogSink {
    fn record(&self, entry: ProgressEntry) {
        log::log!(entry.level, "{}: {}", entry.phase.label(), entry.message);

        match self.transcript.lock() {
            Ok(mut transcript) => transcript.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Sink collecting messages in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub entries: Mutex<Vec<ProgressEntry>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

#[cfg(test)]
impl ProgressSink for MemorySink {
    fn record(&self, entry: ProgressEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sink_saves_transcript() {
        let sink = LogSink::new();
        sink.info(Phase::Commit, "Record Home created".to_string());
        sink.warn(Phase::Deferred, "Association already exists".to_string());
        assert_eq!(sink.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        sink.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO] Import: Record Home created"));
        assert!(lines[1].contains("[WARN] Import (references)"));
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::default();
        sink.error(Phase::Export, "boom".to_string());
        assert!(sink.contains("boom"));
    }
}
