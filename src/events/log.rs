//! Append-only per-session JSONL event log.

use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::debug;

use crate::models::event::EventEnvelope;
use crate::{AppError, Result};

/// Appends one JSON object per line to `<log_dir>/<session_id>.jsonl`.
///
/// Every append is flushed before returning so a crash loses at most the
/// event being written.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    writer: BufWriter<fs::File>,
    next_sequence: u64,
}

impl EventLog {
    /// Open (or create) the log for `session_id` under `log_dir`.
    ///
    /// Creates `log_dir` and all parent directories if they do not exist.
    /// An existing log is scanned so [`EventLog::next_sequence`] continues
    /// after the highest sequence already recorded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory or file cannot be opened.
    pub fn open(log_dir: &Path, session_id: &str) -> Result<Self> {
        fs::create_dir_all(log_dir).map_err(|e| {
            AppError::Io(format!(
                "failed to create event log directory {}: {e}",
                log_dir.display()
            ))
        })?;

        let path = log_dir.join(format!("{session_id}.jsonl"));
        let next_sequence = recorded_next_sequence(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                AppError::Io(format!("failed to open event log {}: {e}", path.display()))
            })?;

        debug!(path = %path.display(), next_sequence, "event log opened");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            next_sequence,
        })
    }

    /// One past the highest sequence found in the log when it was opened.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one envelope as a JSON line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if serialization, write, or flush fails.
    pub fn append(&mut self, envelope: &EventEnvelope) -> Result<()> {
        let line = serde_json::to_string(envelope)
            .map_err(|e| AppError::Io(format!("failed to serialize event: {e}")))?;
        writeln!(self.writer, "{line}")
            .map_err(|e| AppError::Io(format!("event log write failed: {e}")))?;
        self.writer
            .flush()
            .map_err(|e| AppError::Io(format!("event log flush failed: {e}")))?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct RecordedSequence {
    sequence: Option<u64>,
}

/// Scan an existing log for its highest sequence. Unparseable lines (a torn
/// final write, for instance) are skipped.
fn recorded_next_sequence(path: &Path) -> Result<u64> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(AppError::Io(format!(
                "failed to read event log {}: {e}",
                path.display()
            )))
        }
    };

    let mut next = 0;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| AppError::Io(format!("event log read failed: {e}")))?;
        let Ok(recorded) = serde_json::from_str::<RecordedSequence>(&line) else {
            continue;
        };
        if let Some(sequence) = recorded.sequence {
            next = next.max(sequence.saturating_add(1));
        }
    }
    Ok(next)
}
