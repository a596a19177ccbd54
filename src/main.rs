//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the tokio runtime (multi-thread, 2 workers) — model loading
//!    runs on its blocking pool so the menu stays responsive.
//! 4. Run the interactive menu until the user exits.

use anyhow::Result;

use mic_scribe::app::App;
use mic_scribe::config::AppConfig;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("mic-scribe starting up");

    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let mut app = App::new(config);
    app.run(&rt)
}
