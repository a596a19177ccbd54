//! Append-only transcript files.
//!
//! One `transcript_<device>.txt` per device plus a shared
//! `transcript_all.txt` in multi-device mode.  The sink holds no state
//! beyond the output directory: every append opens the file, writes one
//! whole line (or header block) and closes it again, so a crash can never
//! leave a handle half-open and existing content is never truncated —
//! transcripts survive process restarts and simply grow.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::transcript::SessionRecord;

/// File receiving the merged, device-tagged lines in multi-device mode.
const AGGREGATE_FILE: &str = "transcript_all.txt";

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

/// Transcript write failure (disk full, permissions).  Callers report it and
/// continue; only the affected write attempt is lost.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transcript write failed: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// TranscriptSink
// ---------------------------------------------------------------------------

/// Serializes finalized text lines to per-device and aggregate transcript
/// files under one output directory.
#[derive(Debug)]
pub struct TranscriptSink {
    dir: PathBuf,
}

impl TranscriptSink {
    /// The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory this sink writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a session header for `device_name`, listing `active_devices`
    /// in order.  Called by the recognizer pool each time the device's
    /// recognizer is (re)created.
    pub fn start_new_session(
        &self,
        device_name: &str,
        active_devices: &[String],
    ) -> Result<(), SinkError> {
        let record = SessionRecord::new(Local::now(), device_name, active_devices.to_vec());
        self.append(
            &self.device_file(record.device_name()),
            record.header().as_bytes(),
        )
    }

    /// Append one finalized text line.
    ///
    /// The per-device file always receives the raw `text` line.  When
    /// `device_id` is present (multi-device mode) the aggregate file
    /// additionally receives `"[HH:MM:SS] [id]: text"`.  The two appends are
    /// independent: a failure of one does not suppress the other, and no
    /// transactional pairing is attempted.
    pub fn append_transcription(
        &self,
        device_name: &str,
        text: &str,
        timestamp: DateTime<Local>,
        device_id: Option<u32>,
    ) -> Result<(), SinkError> {
        let per_device = self.append(
            &self.device_file(device_name),
            format!("{text}\n").as_bytes(),
        );

        let aggregate = match device_id {
            Some(id) => {
                let line = format!("[{}] [{}]: {}\n", timestamp.format("%H:%M:%S"), id, text);
                self.append(&self.dir.join(AGGREGATE_FILE), line.as_bytes())
            }
            None => Ok(()),
        };

        per_device.and(aggregate)
    }

    /// Per-device transcript path; path separators in the device name are
    /// flattened so the name can never escape the output directory.
    fn device_file(&self, device_name: &str) -> PathBuf {
        let stem: String = device_name
            .chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '_',
                other => other,
            })
            .collect();
        self.dir.join(format!("transcript_{stem}.txt"))
    }

    /// Single whole-buffer append: open, write, close.
    fn append(&self, path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(bytes)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
