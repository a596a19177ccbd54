//! Speech-to-text engine module.
//!
//! The pipeline only ever talks to the [`RecognitionEngine`] /
//! [`EngineFactory`] traits; the concrete Vosk backend lives in
//! [`vosk`](self::vosk) behind the `vosk` cargo feature so the rest of the
//! crate builds and tests without the native library.
//!
//! ```text
//! ModelCatalog ──resolve──▶ model dir
//!                               │
//!                 VoskModelProvider::get (load once, blocking pool)
//!                               │
//!                    VoskEngineFactory::create  (one per device)
//!                               │
//!             RecognitionEngine::accept_pcm / result
//! ```

pub mod engine;
pub mod model;

#[cfg(feature = "vosk")]
pub mod vosk;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{EngineError, EngineFactory, RecognitionEngine};
pub use model::{resolve_model_dir, ModelCatalog, ModelEntry};

#[cfg(feature = "vosk")]
pub use vosk::{VoskEngine, VoskEngineFactory, VoskModelProvider};

// test-only re-export so pipeline test modules can import the doubles
// without `use crate::stt::engine::MockEngineFactory`.
#[cfg(test)]
pub use engine::{MockEngine, MockEngineFactory};
