//! Vosk-backed recognition engine (enabled with the `vosk` cargo feature).
//!
//! [`VoskModelProvider`] loads the model directory once and hands out shared
//! handles; loading runs on the blocking thread pool so the interactive menu
//! stays responsive.  [`VoskEngineFactory`] then builds one
//! [`VoskEngine`] per capture device, configured for a single best
//! hypothesis with word-level metadata at the fixed capture rate.

use std::path::Path;
use std::sync::Arc;

use vosk::{CompleteResult, DecodingState, Model, Recognizer};

use crate::stt::{resolve_model_dir, EngineError, EngineFactory, RecognitionEngine};

// ---------------------------------------------------------------------------
// VoskModelProvider
// ---------------------------------------------------------------------------

/// Load-once-reuse provider for the Vosk model.
///
/// The first [`get`](Self::get) loads the model (a long, blocking operation)
/// via `spawn_blocking`; subsequent calls return the cached handle.
/// [`dispose`](Self::dispose) drops the cache so a different model can be
/// loaded next.
#[derive(Default)]
pub struct VoskModelProvider {
    cached: tokio::sync::Mutex<Option<Arc<Model>>>,
}

impl VoskModelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared model handle, loading it on first use.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ModelNotFound`] — `path` is not an existing directory.
    /// - [`EngineError::EngineUnavailable`] — the model failed to load.
    pub async fn get(&self, path: &Path) -> Result<Arc<Model>, EngineError> {
        let mut cached = self.cached.lock().await;
        if let Some(model) = cached.as_ref() {
            return Ok(Arc::clone(model));
        }

        let dir = resolve_model_dir(path)?;
        let dir_str = dir
            .to_str()
            .ok_or_else(|| {
                EngineError::ModelNotFound(format!(
                    "model path contains non-UTF-8 characters: {}",
                    dir.display()
                ))
            })?
            .to_owned();

        let display = dir.display().to_string();
        let model = tokio::task::spawn_blocking(move || Model::new(dir_str.as_str()))
            .await
            .map_err(|e| EngineError::EngineUnavailable(e.to_string()))?
            .ok_or_else(|| {
                EngineError::EngineUnavailable(format!("failed to load model from {display}"))
            })?;

        let model = Arc::new(model);
        *cached = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Drop the cached model.  Safe to call when nothing is loaded.
    pub async fn dispose(&self) {
        self.cached.lock().await.take();
    }
}

// ---------------------------------------------------------------------------
// VoskEngineFactory
// ---------------------------------------------------------------------------

/// Builds per-device [`VoskEngine`] instances against a shared model.
pub struct VoskEngineFactory {
    model: Arc<Model>,
    sample_rate: f32,
}

impl VoskEngineFactory {
    /// `sample_rate` must match the capture layer's fixed rate.
    pub fn new(model: Arc<Model>, sample_rate: u32) -> Self {
        Self {
            model,
            sample_rate: sample_rate as f32,
        }
    }
}

impl EngineFactory for VoskEngineFactory {
    fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
        let mut recognizer = Recognizer::new(&self.model, self.sample_rate).ok_or_else(|| {
            EngineError::EngineUnavailable("vosk recognizer construction failed".into())
        })?;

        // Single best hypothesis only; keep word-level timing metadata.
        recognizer.set_max_alternatives(0);
        recognizer.set_words(true);

        Ok(Box::new(VoskEngine {
            recognizer,
            _model: Arc::clone(&self.model),
        }))
    }
}

// ---------------------------------------------------------------------------
// VoskEngine
// ---------------------------------------------------------------------------

/// Streaming recognizer for one capture device.
pub struct VoskEngine {
    recognizer: Recognizer,
    // Keeps the shared model alive for as long as the recognizer exists.
    _model: Arc<Model>,
}

impl RecognitionEngine for VoskEngine {
    fn accept_pcm(&mut self, pcm: &[i16]) -> Result<bool, EngineError> {
        match self.recognizer.accept_waveform(pcm) {
            DecodingState::Finalized => Ok(true),
            DecodingState::Running => Ok(false),
            DecodingState::Failed => {
                Err(EngineError::Recognition("waveform decoding failed".into()))
            }
        }
    }

    fn result(&mut self) -> Result<String, EngineError> {
        match self.recognizer.result() {
            CompleteResult::Single(single) => {
                let words: Vec<serde_json::Value> = single
                    .result
                    .iter()
                    .map(|w| {
                        serde_json::json!({
                            "word": w.word,
                            "start": w.start,
                            "end": w.end,
                            "conf": w.conf,
                        })
                    })
                    .collect();
                Ok(serde_json::json!({ "text": single.text, "result": words }).to_string())
            }
            CompleteResult::Multiple(_) => Err(EngineError::Recognition(
                "unexpected n-best result from a single-hypothesis recognizer".into(),
            )),
        }
    }
}
