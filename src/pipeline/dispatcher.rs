//! Audio-frame fan-in: capture callbacks → recognizer pool → transcript sink.
//!
//! [`PipelineDispatcher::on_audio_frame`] is the single entry point the
//! capture layer invokes, once per delivered chunk, from each device's own
//! callback thread.  It never blocks beyond the cost of recognizer
//! inference, and a failure on one device never aborts processing for the
//! others.

use std::sync::Arc;

use crate::pipeline::{FinalizedSegment, RecognizerPool};
use crate::transcript::TranscriptSink;

/// Observer invoked for every finalized segment (console display).
pub type SegmentObserver = Box<dyn Fn(&FinalizedSegment) + Send + Sync>;

/// Routes each incoming audio frame to the right recognizer and forwards
/// finalized segments to the transcript sink.
pub struct PipelineDispatcher {
    pool: Arc<RecognizerPool>,
    sink: Arc<TranscriptSink>,
    /// In multi-device mode segments carry their ordinal device id, which
    /// routes a tagged copy of each line into the aggregate transcript.
    multi_device: bool,
    observer: Option<SegmentObserver>,
}

impl PipelineDispatcher {
    pub fn new(pool: Arc<RecognizerPool>, sink: Arc<TranscriptSink>, multi_device: bool) -> Self {
        Self {
            pool,
            sink,
            multi_device,
            observer: None,
        }
    }

    /// Register an observer called with every finalized segment after it has
    /// been handed to the sink.
    pub fn with_observer(mut self, observer: SegmentObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Handle one audio chunk from `device_name`.
    ///
    /// Chunks for a single device arrive strictly in order on one callback
    /// stream; the pool serializes feed/reset per device name, so this may
    /// be called concurrently for distinct devices.  The segment timestamp
    /// is captured at the moment of finalization, not audio arrival.
    pub fn on_audio_frame(&self, device_name: &str, device_id: u32, pcm: &[i16]) {
        let segment = match self.pool.feed(device_name, pcm) {
            Ok(Some(segment)) => segment,
            Ok(None) => return,
            Err(e) => {
                // Isolated: this device's chunk is lost, others keep going.
                log::warn!("recognition failed for '{device_name}': {e}");
                return;
            }
        };

        let segment = FinalizedSegment {
            device_id: self.multi_device.then_some(device_id),
            ..segment
        };

        if let Err(e) = self.sink.append_transcription(
            &segment.device_name,
            &segment.text,
            segment.timestamp,
            segment.device_id,
        ) {
            // Best effort: report and drop only this write attempt.
            log::warn!("transcript write failed for '{}': {e}", segment.device_name);
        }

        if let Some(observer) = &self.observer {
            observer(&segment);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pool::DEFAULT_RESET_INTERVAL;
    use crate::stt::{EngineFactory, MockEngineFactory};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    fn payload(text: &str) -> Option<String> {
        Some(format!("{{\"text\": \"{text}\"}}"))
    }

    fn dispatcher_with(
        script: Vec<Option<String>>,
        devices: &[&str],
        multi: bool,
    ) -> (PipelineDispatcher, TempDir) {
        let dir = tempdir().expect("temp dir");
        let factory: Arc<dyn EngineFactory> = Arc::new(MockEngineFactory::new(script));
        let sink = Arc::new(TranscriptSink::new(dir.path()));
        let pool = Arc::new(RecognizerPool::new(
            factory,
            Arc::clone(&sink),
            devices.iter().map(|d| d.to_string()).collect(),
            DEFAULT_RESET_INTERVAL,
        ));
        (PipelineDispatcher::new(pool, sink, multi), dir)
    }

    fn read(dir: &TempDir, name: &str) -> String {
        fs::read_to_string(dir.path().join(name)).unwrap_or_default()
    }

    #[test]
    fn single_device_mode_writes_only_per_device_file() {
        let (dispatcher, dir) = dispatcher_with(vec![payload("привет мир")], &["Mic A"], false);

        dispatcher.on_audio_frame("Mic A", 1, &[0; 160]);

        let per_device = read(&dir, "transcript_Mic A.txt");
        assert!(per_device.ends_with("привет мир\n"));
        assert!(!dir.path().join("transcript_all.txt").exists());
    }

    #[test]
    fn multi_device_mode_tags_aggregate_lines_in_arrival_order() {
        let (dispatcher, dir) =
            dispatcher_with(vec![payload("spoken line")], &["Mic A", "Mic B"], true);

        dispatcher.on_audio_frame("Mic B", 2, &[0; 160]);
        dispatcher.on_audio_frame("Mic A", 1, &[0; 160]);

        // Both per-device files got their raw line plus a header each.
        assert!(read(&dir, "transcript_Mic A.txt").contains("spoken line"));
        assert!(read(&dir, "transcript_Mic B.txt").contains("spoken line"));

        let aggregate = read(&dir, "transcript_all.txt");
        let lines: Vec<&str> = aggregate.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[2]: spoken line"));
        assert!(lines[1].contains("[1]: spoken line"));
    }

    #[test]
    fn interim_results_produce_no_output() {
        let (dispatcher, dir) = dispatcher_with(vec![None, None], &["Mic A"], false);

        dispatcher.on_audio_frame("Mic A", 1, &[0; 160]);
        dispatcher.on_audio_frame("Mic A", 1, &[0; 160]);

        // Only the session header is present — no text lines.
        let content = read(&dir, "transcript_Mic A.txt");
        assert!(content.contains("=== New recording session"));
        assert!(!content.lines().any(|l| !l.is_empty()
            && !l.starts_with("===")
            && !l.starts_with("Active microphones")
            && !l.starts_with('[')));
    }

    #[test]
    fn engine_failure_is_swallowed_and_isolated() {
        let (dispatcher, dir) =
            dispatcher_with(vec![Some("not json".into())], &["Mic A", "Mic B"], true);

        // Mic A hits the malformed payload; must not panic.
        dispatcher.on_audio_frame("Mic A", 1, &[0; 160]);
        // Mic B starts its own script and still works.
        dispatcher.on_audio_frame("Mic B", 2, &[0; 160]);

        assert!(read(&dir, "transcript_Mic B.txt").contains("=== New recording session"));
    }

    #[test]
    fn observer_sees_every_finalized_segment() {
        let (dispatcher, _dir) =
            dispatcher_with(vec![payload("one"), payload("two")], &["Mic A"], true);

        let seen: Arc<Mutex<Vec<FinalizedSegment>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let dispatcher = dispatcher.with_observer(Box::new(move |segment: &FinalizedSegment| {
            seen_clone.lock().unwrap().push(segment.clone());
        }));

        dispatcher.on_audio_frame("Mic A", 1, &[0; 160]);
        dispatcher.on_audio_frame("Mic A", 1, &[0; 160]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].text, "one");
        assert_eq!(seen[0].device_id, Some(1));
        assert_eq!(seen[1].text, "two");
    }

    #[test]
    fn dispatcher_is_shareable_across_capture_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineDispatcher>();
    }
}
