//! Configuration module — `AppConfig` (TOML persistence) and `AppPaths`
//! (cross-platform data directories).

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, ModelSpec, RecognizerConfig};
