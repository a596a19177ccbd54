//! Console controller — menu loop wiring capture, pipeline and transcripts.
//!
//! The menu mirrors a plain interactive flow: load a model, pick one or
//! several microphones, start/stop recording, exit.  All recognition state
//! (model, recognizer pool, dispatcher) is owned here and torn down on exit;
//! nothing lives in globals.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::runtime::Runtime;

use crate::audio::{self, FrameCallback, MicrophoneCapture};
use crate::config::AppConfig;
use crate::pipeline::{FinalizedSegment, PipelineDispatcher, RecognizerPool};
use crate::stt::{EngineError, EngineFactory, ModelCatalog};
use crate::transcript::TranscriptSink;

// ---------------------------------------------------------------------------
// Backend — model lifecycle behind the `vosk` feature
// ---------------------------------------------------------------------------

/// Owns the recognition model.  Built without the `vosk` feature every
/// operation reports the backend as unavailable, so the menu still runs on
/// machines without the native library.
struct Backend {
    #[cfg(feature = "vosk")]
    provider: crate::stt::VoskModelProvider,
    #[cfg(feature = "vosk")]
    model: Option<Arc<vosk::Model>>,
}

impl Backend {
    fn new() -> Self {
        Self {
            #[cfg(feature = "vosk")]
            provider: crate::stt::VoskModelProvider::new(),
            #[cfg(feature = "vosk")]
            model: None,
        }
    }

    fn has_model(&self) -> bool {
        #[cfg(feature = "vosk")]
        {
            self.model.is_some()
        }
        #[cfg(not(feature = "vosk"))]
        {
            false
        }
    }

    /// Load the model at `path`, memoized across calls.  Runs on the
    /// blocking pool so the menu thread merely waits instead of doing the
    /// work itself.
    fn load(&mut self, rt: &Runtime, path: &Path) -> Result<(), EngineError> {
        #[cfg(feature = "vosk")]
        {
            let model = rt.block_on(self.provider.get(path))?;
            self.model = Some(model);
            Ok(())
        }
        #[cfg(not(feature = "vosk"))]
        {
            let _ = (rt, path);
            Err(EngineError::EngineUnavailable(
                "this build does not include the vosk backend (rebuild with --features vosk)"
                    .into(),
            ))
        }
    }

    fn factory(&self, sample_rate: u32) -> Option<Arc<dyn EngineFactory>> {
        #[cfg(feature = "vosk")]
        {
            self.model.as_ref().map(|model| {
                Arc::new(crate::stt::VoskEngineFactory::new(
                    Arc::clone(model),
                    sample_rate,
                )) as Arc<dyn EngineFactory>
            })
        }
        #[cfg(not(feature = "vosk"))]
        {
            let _ = sample_rate;
            None
        }
    }

    fn dispose(&mut self, rt: &Runtime) {
        #[cfg(feature = "vosk")]
        {
            self.model = None;
            rt.block_on(self.provider.dispose());
        }
        #[cfg(not(feature = "vosk"))]
        {
            let _ = rt;
        }
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// The interactive application: owns the capture layer, the transcript sink
/// and the per-session pipeline objects.
pub struct App {
    config: AppConfig,
    catalog: ModelCatalog,
    capture: MicrophoneCapture,
    sink: Arc<TranscriptSink>,
    backend: Backend,
    pool: Option<Arc<RecognizerPool>>,
    dispatcher: Option<Arc<PipelineDispatcher>>,
    /// Fingerprint of the selection the current dispatcher was built for.
    session_devices: Vec<String>,
    session_multi: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let catalog = ModelCatalog::from_config(&config);
        let sink = Arc::new(TranscriptSink::new(config.transcription_dir.clone()));
        Self {
            config,
            catalog,
            capture: MicrophoneCapture::new(),
            sink,
            backend: Backend::new(),
            pool: None,
            dispatcher: None,
            session_devices: Vec::new(),
            session_multi: false,
        }
    }

    /// Run the menu loop until the user exits.
    pub fn run(&mut self, rt: &Runtime) -> Result<()> {
        loop {
            print_menu();
            let choice = read_line("Choose an action: ")?;
            match choice.trim() {
                "1" => self.load_model(rt),
                "2" => self.select_devices(false),
                "3" => self.select_devices(true),
                "4" => self.start_recording(),
                "5" => self.stop_recording(),
                "9" => {
                    self.cleanup(rt);
                    return Ok(());
                }
                other => println!("Unknown choice: '{other}'"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Menu actions
    // -----------------------------------------------------------------------

    fn load_model(&mut self, rt: &Runtime) {
        if self.backend.has_model() {
            // Load-once-reuse: the provider memoizes the first model.
            println!("Model already loaded.");
            return;
        }

        println!("\nAvailable models:");
        for (i, entry) in self.catalog.entries().iter().enumerate() {
            println!("{}. {}", i + 1, entry.label);
        }

        let input = match read_line("\nChoose a model: ") {
            Ok(input) => input,
            Err(e) => {
                println!("Failed to read input: {e}");
                return;
            }
        };
        let choice: usize = match input.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                println!("Invalid model choice. Using model 1.");
                1
            }
        };

        let path = match self.catalog.resolve(choice) {
            Ok(path) => path.to_path_buf(),
            Err(e) => {
                println!("Cannot load model: {e}");
                return;
            }
        };

        println!("Loading model from: {}", path.display());
        let started = Instant::now();
        match self.backend.load(rt, &path) {
            Ok(()) => display_load_time(started.elapsed()),
            Err(e) => println!("Model load failed: {e}"),
        }
    }

    fn select_devices(&mut self, multi: bool) {
        let available = match audio::list_input_devices() {
            Ok(names) => names,
            Err(e) => {
                println!("Failed to list microphones: {e}");
                return;
            }
        };

        println!("\nAvailable microphones:");
        for (i, name) in available.iter().enumerate() {
            println!("{}. {}", i + 1, name);
        }

        let prompt = if multi {
            "\nChoose microphone numbers, comma separated (e.g. 1,2,3): "
        } else {
            "\nChoose a microphone number: "
        };
        let input = match read_line(prompt) {
            Ok(input) => input,
            Err(e) => {
                println!("Failed to read input: {e}");
                return;
            }
        };

        let indices = match audio::parse_selection(&input, available.len()) {
            Ok(indices) => indices,
            Err(e) => {
                println!("{e}");
                return;
            }
        };
        if !multi && indices.len() > 1 {
            println!("Choose exactly one microphone in single mode.");
            return;
        }

        if let Err(e) = self.capture.select(&indices, &available, multi) {
            println!("{e}");
            return;
        }

        // Selection changed: the old session's recognizers are stale.
        self.teardown_pipeline();

        println!("\nSelected microphones: {}", self.capture.device_names().len());
        for name in self.capture.device_names() {
            println!("- {name}");
        }
    }

    fn start_recording(&mut self) {
        if self.capture.is_recording() {
            println!("Recording is already running.");
            return;
        }
        let Some(factory) = self.backend.factory(self.config.recognizer.sample_rate) else {
            println!("Model is not loaded! Load a model first (option 1).");
            return;
        };
        if !self.capture.is_initialized() {
            println!("No microphone selected! Select one first (option 2 or 3).");
            return;
        }

        self.ensure_pipeline(factory);
        let Some(dispatcher) = self.dispatcher.clone() else {
            return;
        };

        let callback: FrameCallback =
            Arc::new(move |pcm: &[i16], device_name: &str, device_id: u32| {
                dispatcher.on_audio_frame(device_name, device_id, pcm);
            });
        self.capture.set_frame_callback(callback);

        match self.capture.start() {
            Ok(0) => println!("No capture stream could be started."),
            Ok(_) => {
                println!("\nRecording started. Using microphones:");
                for name in self.capture.device_names() {
                    println!("- {name}");
                }
                println!("Stop with option 5.");
            }
            Err(e) => println!("Failed to start recording: {e}"),
        }
    }

    fn stop_recording(&mut self) {
        if !self.capture.is_recording() {
            println!("Recording was not started.");
            return;
        }
        self.capture.stop();
        println!("Recording stopped.");
    }

    fn cleanup(&mut self, rt: &Runtime) {
        self.capture.stop();
        self.teardown_pipeline();
        self.backend.dispose(rt);
    }

    // -----------------------------------------------------------------------
    // Pipeline lifecycle
    // -----------------------------------------------------------------------

    /// Build pool and dispatcher for the current selection, reusing them
    /// across stop/start as long as the selection is unchanged (recognizers
    /// survive a pause; the reset interval replaces them as needed).
    fn ensure_pipeline(&mut self, factory: Arc<dyn EngineFactory>) {
        let devices = self.capture.device_names();
        let multi = self.capture.is_multi_mode();
        if self.dispatcher.is_some()
            && self.session_devices == devices
            && self.session_multi == multi
        {
            return;
        }

        self.teardown_pipeline();

        let pool = Arc::new(RecognizerPool::new(
            factory,
            Arc::clone(&self.sink),
            devices.clone(),
            self.config.recognizer.reset_interval(),
        ));
        let dispatcher = PipelineDispatcher::new(Arc::clone(&pool), Arc::clone(&self.sink), multi)
            .with_observer(Box::new(print_segment));

        self.pool = Some(pool);
        self.dispatcher = Some(Arc::new(dispatcher));
        self.session_devices = devices;
        self.session_multi = multi;
    }

    fn teardown_pipeline(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.dispose_all();
        }
        self.dispatcher = None;
        self.session_devices.clear();
        self.session_multi = false;
    }
}

// ---------------------------------------------------------------------------
// Console helpers
// ---------------------------------------------------------------------------

fn print_menu() {
    println!("\n=== Menu ===");
    println!("1. Load model");
    println!("2. Select a microphone");
    println!("3. Select several microphones");
    println!("4. Start recording");
    println!("5. Stop recording");
    println!("9. Exit");
}

fn read_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

/// Console echo of a finalized segment, matching the transcript formats.
fn print_segment(segment: &FinalizedSegment) {
    let time = segment.timestamp.format("%H:%M:%S");
    match segment.device_id {
        Some(id) => println!("[{time}] [{id}]: {}", segment.text),
        None => println!("[{time}]: {}", segment.text),
    }
}

fn display_load_time(elapsed: Duration) {
    let secs = elapsed.as_secs_f32();
    if secs >= 60.0 {
        println!(
            "Model loaded in {} min {} s",
            elapsed.as_secs() / 60,
            elapsed.as_secs() % 60
        );
    } else {
        println!("Model loaded in {secs:.1} s");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
