//! JSONL trade journal.
//!
//! Every trade event becomes one JSON object per line, stamped with the UTC
//! time it was recorded. Each line stands alone, so a partial write costs at
//! most the last entry.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trailbot_core::engine::{EventSink, TradeEvent};

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TradeEvent,
}

/// Append-only JSONL event sink.
pub struct JsonlJournal {
    path: PathBuf,
    include_routine: bool,
    // Serializes appends from concurrent emitters.
    write_lock: Mutex<()>,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            include_routine: false,
            write_lock: Mutex::new(()),
        }
    }

    /// Also record skips that happen on every quiet pass.
    pub fn with_routine_skips(mut self, include: bool) -> Self {
        self.include_routine = include;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn should_write(&self, event: &TradeEvent) -> bool {
        match event {
            TradeEvent::TradeSkipped { reason, .. } => self.include_routine || !reason.is_routine(),
            _ => true,
        }
    }

    /// Append an entry. Returns `Ok(false)` when the event is filtered out.
    pub fn append(&self, event: &TradeEvent) -> io::Result<bool> {
        if !self.should_write(event) {
            return Ok(false);
        }

        let entry = JournalEntry {
            ts: Utc::now(),
            event: event.clone(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{json}")?;
        file.flush()?;

        Ok(true)
    }

    /// Read all entries, skipping malformed lines.
    pub fn read_all(&self) -> io::Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(_) => continue, // skip malformed lines
            }
        }

        Ok(entries)
    }
}

impl EventSink for JsonlJournal {
    fn emit(&self, event: &TradeEvent) {
        if let Err(e) = self.append(event) {
            // The journal is an audit trail; trading continues without it.
            tracing::warn!(path = %self.path.display(), error = %e, "journal write failed");
        }
    }
}
