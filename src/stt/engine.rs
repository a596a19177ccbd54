//! Core recognition-engine traits and errors.
//!
//! # Overview
//!
//! [`RecognitionEngine`] is the streaming interface consumed by the pipeline:
//! feed 16 kHz mono S16LE PCM, get `true` back when the engine judges an
//! utterance complete, then collect the finalized result payload.  It is
//! object-safe and `Send` so one boxed instance can live inside each
//! per-device recognizer slot.
//!
//! [`EngineFactory`] constructs engine instances — the recognizer pool calls
//! it once per device (re)creation, so all engine configuration (sample rate,
//! single best hypothesis, word metadata) belongs to the factory.
//!
//! [`MockEngine`] / [`MockEngineFactory`] (available under `#[cfg(test)]`)
//! are zero-dependency doubles driven by a scripted sequence of results —
//! useful for unit-testing the pool and dispatcher without a real model.

use thiserror::Error;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// All errors that can arise from the recognition subsystem.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The configured model directory does not exist.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Model load or recognizer construction failed; the affected device
    /// stream is skipped, other devices are unaffected.
    #[error("recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine rejected audio or produced an unreadable result payload.
    #[error("recognition failed: {0}")]
    Recognition(String),
}

// ---------------------------------------------------------------------------
// RecognitionEngine trait
// ---------------------------------------------------------------------------

/// Object-safe streaming speech recognizer.
///
/// One instance serves exactly one capture device; instances are never shared
/// across devices, so the trait only requires `Send` (the pool serializes all
/// calls per device).
///
/// # Contract
///
/// - `pcm` must be 16 kHz, mono, signed 16-bit PCM samples.
/// - [`accept_pcm`](Self::accept_pcm) returns `true` when an utterance
///   boundary was reached; the finalized payload must then be collected with
///   [`result`](Self::result) before more audio is fed.
/// - [`result`](Self::result) returns a JSON object carrying at least a
///   `"text"` field.  Interim/partial hypotheses are never exposed.
pub trait RecognitionEngine: Send {
    /// Feed a chunk of PCM samples; `true` signals an utterance boundary.
    fn accept_pcm(&mut self, pcm: &[i16]) -> Result<bool, EngineError>;

    /// Finalized result payload for the utterance that just completed.
    fn result(&mut self) -> Result<String, EngineError>;
}

// Compile-time assertion: Box<dyn RecognitionEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn RecognitionEngine>) {}
};

// Test-only: lets `Result<Box<dyn RecognitionEngine>, _>::unwrap_err` format the
// Ok payload in assertions. No behavior; confined to test builds.
#[cfg(test)]
impl std::fmt::Debug for dyn RecognitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RecognitionEngine")
    }
}

// ---------------------------------------------------------------------------
// EngineFactory trait
// ---------------------------------------------------------------------------

/// Constructs fully configured [`RecognitionEngine`] instances.
///
/// Held behind an `Arc<dyn EngineFactory>` by the recognizer pool and called
/// from any device's capture thread, hence `Send + Sync`.
///
/// # Errors
///
/// Returns [`EngineError::EngineUnavailable`] when construction fails; the
/// caller must treat the attempt as atomic (no half-initialised instance is
/// ever returned).
pub trait EngineFactory: Send + Sync {
    /// Build a new engine instance bound to the fixed capture sample rate.
    fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError>;
}

// ---------------------------------------------------------------------------
// MockEngine / MockEngineFactory  (test-only)
// ---------------------------------------------------------------------------

/// Scripted test double for [`RecognitionEngine`].
///
/// Each [`accept_pcm`](RecognitionEngine::accept_pcm) call consumes one step
/// of the script: `Some(payload)` finalizes with that payload, `None` keeps
/// decoding.  A drained script keeps decoding forever.
#[cfg(test)]
pub struct MockEngine {
    script: std::collections::VecDeque<Option<String>>,
    pending: Option<String>,
    live: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl RecognitionEngine for MockEngine {
    fn accept_pcm(&mut self, _pcm: &[i16]) -> Result<bool, EngineError> {
        match self.script.pop_front() {
            Some(Some(payload)) => {
                self.pending = Some(payload);
                Ok(true)
            }
            Some(None) | None => Ok(false),
        }
    }

    fn result(&mut self) -> Result<String, EngineError> {
        self.pending
            .take()
            .ok_or_else(|| EngineError::Recognition("no finalized result pending".into()))
    }
}

#[cfg(test)]
impl Drop for MockEngine {
    fn drop(&mut self) {
        self.live
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Factory double that hands every new [`MockEngine`] a clone of the same
/// script and tracks construction counts.
///
/// `created()` counts every successful `create()`; `live()` tracks instances
/// not yet dropped, which lets tests assert the at-most-one-live-instance
/// invariant across recognizer resets.
#[cfg(test)]
pub struct MockEngineFactory {
    script: Vec<Option<String>>,
    created: std::sync::atomic::AtomicUsize,
    live: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockEngineFactory {
    /// Factory whose engines replay `script` step by step.
    pub fn new(script: Vec<Option<String>>) -> Self {
        Self {
            script,
            created: std::sync::atomic::AtomicUsize::new(0),
            live: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Make subsequent `create()` calls fail (or succeed again) on demand.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of engines constructed so far.
    pub fn created(&self) -> usize {
        self.created.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of constructed engines not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl EngineFactory for MockEngineFactory {
    fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
        use std::sync::atomic::Ordering;

        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::EngineUnavailable(
                "mock factory configured to fail".into(),
            ));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockEngine {
            script: self.script.clone().into(),
            pending: None,
            live: std::sync::Arc::clone(&self.live),
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
