//! In-memory record of everything shown in the output pane.

use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub text: String,
}

impl LogEntry {
    /// `HH:MM:SS: text`
    pub fn render(&self) -> String {
        format!("{}: {}", self.at.format("%H:%M:%S"), self.text)
    }
}

/// Append-only list of timestamped messages, saved only on request.
#[derive(Debug, Default)]
pub struct DownloadLog {
    entries: Vec<LogEntry>,
}

impl DownloadLog {
    pub fn push(&mut self, text: impl Into<String>) {
        self.push_at(Local::now(), text);
    }

    pub fn push_at(&mut self, at: DateTime<Local>, text: impl Into<String>) {
        self.entries.push(LogEntry { at, text: text.into() });
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(LogEntry::render).collect()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.lines().join("\n"))?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "download log saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_clock_prefix() {
        let mut log = DownloadLog::default();
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 5, 7).unwrap();
        log.push_at(at, "Download stopped.");
        assert_eq!(log.lines(), vec!["09:05:07: Download stopped.".to_string()]);
    }

    #[test]
    fn saves_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let at = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut log = DownloadLog::default();
        log.push_at(at, "first");
        log.push_at(at, "второй");
        log.save_to(&path).unwrap();
        let saved = std::fs::read_to_string(&path).unwrap();
        assert_eq!(saved, "12:00:00: first\n12:00:00: второй");
    }
}
