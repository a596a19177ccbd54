//! Application settings structs, defaults and TOML persistence.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ModelSpec
// ---------------------------------------------------------------------------

/// One selectable recognition model: menu label plus model directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub label: String,
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// RecognizerConfig
// ---------------------------------------------------------------------------

/// Settings for the recognizer pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Fixed capture/recognition sample rate in Hz.
    pub sample_rate: u32,
    /// Seconds after which a device's recognizer is discarded and replaced,
    /// bounding the engine's internal state growth.
    pub reset_interval_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            reset_interval_secs: 60,
        }
    }
}

impl RecognizerConfig {
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory receiving `transcript_*.txt` files.
    pub transcription_dir: PathBuf,
    /// Recognizer pool settings.
    pub recognizer: RecognizerConfig,
    /// Models offered by the load-model menu, in display order.
    pub models: Vec<ModelSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let models_dir = AppPaths::new().models_dir;
        Self {
            transcription_dir: PathBuf::from("transcription"),
            recognizer: RecognizerConfig::default(),
            models: vec![
                ModelSpec {
                    label: "Small model (faster, less accurate)".into(),
                    path: models_dir.join("vosk-model-small-ru-0.22"),
                },
                ModelSpec {
                    label: "Large model (slower, more accurate)".into(),
                    path: models_dir.join("vosk-model-ru-0.42"),
                },
            ],
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
