//! Model catalog and on-disk path resolution.
//!
//! A Vosk model is a directory, not a single file.  [`ModelCatalog`] holds
//! the configured entries (typically a small/fast and a large/accurate
//! model) and resolves a menu choice to an existing model directory, or
//! [`EngineError::ModelNotFound`] when the directory is missing.

use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::stt::EngineError;

// ---------------------------------------------------------------------------
// ModelEntry
// ---------------------------------------------------------------------------

/// One selectable model: a display label and the model directory.
#[derive(Debug, Clone)]
pub struct ModelEntry {
    /// Human-readable label shown in the selection menu.
    pub label: String,
    /// Directory holding the model files.
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// ModelCatalog
// ---------------------------------------------------------------------------

/// The set of models the user can choose from, in menu order.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

impl ModelCatalog {
    /// Build the catalog from the application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let entries = config
            .models
            .iter()
            .map(|m| ModelEntry {
                label: m.label.clone(),
                path: m.path.clone(),
            })
            .collect();
        Self { entries }
    }

    /// Construct directly from entries (useful in tests).
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self { entries }
    }

    /// All entries in menu order.
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Resolve a 1-based menu choice to a model directory.
    ///
    /// # Errors
    ///
    /// [`EngineError::ModelNotFound`] when the choice is out of range or the
    /// model directory does not exist on disk.
    pub fn resolve(&self, choice: usize) -> Result<&Path, EngineError> {
        let entry = choice
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .ok_or_else(|| EngineError::ModelNotFound(format!("no model entry #{choice}")))?;
        resolve_model_dir(&entry.path)
    }
}

/// Check that `path` is an existing directory and hand it back.
///
/// # Errors
///
/// [`EngineError::ModelNotFound`] carrying the display path when the
/// directory is absent.
pub fn resolve_model_dir(path: &Path) -> Result<&Path, EngineError> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(EngineError::ModelNotFound(path.display().to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn catalog_with(paths: &[&Path]) -> ModelCatalog {
        ModelCatalog::new(
            paths
                .iter()
                .enumerate()
                .map(|(i, p)| ModelEntry {
                    label: format!("model {}", i + 1),
                    path: p.to_path_buf(),
                })
                .collect(),
        )
    }

    #[test]
    fn resolve_existing_model_dir() {
        let dir = tempdir().expect("temp dir");
        let catalog = catalog_with(&[dir.path()]);

        let resolved = catalog.resolve(1).unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[test]
    fn resolve_missing_dir_returns_model_not_found() {
        let catalog = catalog_with(&[Path::new("/nonexistent/vosk-model")]);

        let err = catalog.resolve(1).unwrap_err();
        assert!(matches!(err, EngineError::ModelNotFound(_)));
        assert!(err.to_string().contains("/nonexistent/vosk-model"));
    }

    #[test]
    fn resolve_out_of_range_choice_errors() {
        let dir = tempdir().expect("temp dir");
        let catalog = catalog_with(&[dir.path()]);

        assert!(catalog.resolve(0).is_err());
        assert!(catalog.resolve(2).is_err());
    }

    #[test]
    fn catalog_from_config_preserves_order() {
        let config = AppConfig::default();
        let catalog = ModelCatalog::from_config(&config);

        assert_eq!(catalog.entries().len(), config.models.len());
        for (entry, spec) in catalog.entries().iter().zip(&config.models) {
            assert_eq!(entry.label, spec.label);
            assert_eq!(entry.path, spec.path);
        }
    }
}
