//! Session record and header formatting.

use chrono::{DateTime, Local};

/// Marks the start of a new recognizer lifetime for one device.
///
/// Pure value type: captures the start time, the device the header is for,
/// and the ordered list of currently active microphone names, then renders
/// the header block.  Not retained after the header is written.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    start_time: DateTime<Local>,
    device_name: String,
    active_devices: Vec<String>,
}

impl SessionRecord {
    pub fn new(
        start_time: DateTime<Local>,
        device_name: impl Into<String>,
        active_devices: Vec<String>,
    ) -> Self {
        Self {
            start_time,
            device_name: device_name.into(),
            active_devices,
        }
    }

    /// Device whose transcript file receives this header.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Render the header block:
    ///
    /// ```text
    ///
    /// === New recording session (2026-08-06 10:00:00) ===
    /// Active microphones:
    /// [1] - Mic A
    /// [2] - Mic B
    /// ```
    ///
    /// The microphone list is omitted when no names were given.
    pub fn header(&self) -> String {
        let mut out = String::new();
        out.push('\n');
        out.push_str(&format!(
            "=== New recording session ({}) ===\n",
            self.start_time.format("%Y-%m-%d %H:%M:%S")
        ));

        if !self.active_devices.is_empty() {
            out.push_str("Active microphones:\n");
            for (i, name) in self.active_devices.iter().enumerate() {
                out.push_str(&format!("[{}] - {}\n", i + 1, name));
            }
        }

        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
