//! Per-device recognizer pool with reset-on-timeout.
//!
//! The pool owns every live [`RecognitionEngine`] instance, keyed by device
//! display name.  A device's recognizer is created lazily on its first audio
//! frame and replaced once the reset interval has elapsed, which bounds the
//! engine's internal state growth over long sessions.  Every (re)creation
//! appends a session header to the device's transcript.
//!
//! # Locking
//!
//! Two levels: a coarse map lock held only long enough to fetch or insert a
//! device's slot cell, and a per-device slot mutex held across
//! ensure-and-feed.  Feed and reset for one device are therefore mutually
//! exclusive while distinct devices recognize in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::stt::{EngineError, EngineFactory, RecognitionEngine};
use crate::transcript::TranscriptSink;

/// Recognizers are replaced after this much silence-independent wall time.
/// Policy constant, not derived.
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// FinalizedSegment
// ---------------------------------------------------------------------------

/// One finalized utterance, ready for the transcript sink.
///
/// Ephemeral: produced on an utterance boundary, consumed immediately,
/// never stored.  `device_id` is filled in by the dispatcher in multi-device
/// mode.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedSegment {
    /// Recognized text, already trimmed and known non-empty.
    pub text: String,
    /// Wall-clock time captured at the moment of finalization.
    pub timestamp: DateTime<Local>,
    /// Device the audio originated from.
    pub device_name: String,
    /// Ordinal device id, present only in multi-device mode.
    pub device_id: Option<u32>,
}

// ---------------------------------------------------------------------------
// RecognizerPool
// ---------------------------------------------------------------------------

struct Slot {
    engine: Box<dyn RecognitionEngine>,
    last_reset: Instant,
}

type SlotCell = Arc<Mutex<Option<Slot>>>;

/// Owns one recognizer per active device, with reset-on-timeout policy.
///
/// Constructed per recording session with an explicit context: the engine
/// factory, the transcript sink and the ordered active-device names used for
/// session headers.
pub struct RecognizerPool {
    factory: Arc<dyn EngineFactory>,
    sink: Arc<TranscriptSink>,
    active_devices: Vec<String>,
    reset_interval: Duration,
    slots: Mutex<HashMap<String, SlotCell>>,
}

impl RecognizerPool {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        sink: Arc<TranscriptSink>,
        active_devices: Vec<String>,
        reset_interval: Duration,
    ) -> Self {
        Self {
            factory,
            sink,
            active_devices,
            reset_interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Ordered device names announced in session headers.
    pub fn active_devices(&self) -> &[String] {
        &self.active_devices
    }

    /// Make sure `device_name` has a live recognizer as of `now`, creating
    /// or replacing one per the reset policy.
    ///
    /// # Errors
    ///
    /// [`EngineError::EngineUnavailable`] when construction fails; the slot
    /// is then empty, never half-initialised, and the next call retries.
    pub fn ensure_recognizer(&self, device_name: &str, now: Instant) -> Result<(), EngineError> {
        let cell = self.slot_cell(device_name);
        let mut slot = cell.lock().unwrap();
        self.ensure_locked(device_name, &mut slot, now).map(|_| ())
    }

    /// Forward PCM to the device's recognizer, (re)creating it first if the
    /// reset interval elapsed.  Returns a segment only when the engine
    /// reports an utterance boundary whose extracted text is non-empty after
    /// trimming; interim hypotheses are never surfaced.
    pub fn feed(
        &self,
        device_name: &str,
        pcm: &[i16],
    ) -> Result<Option<FinalizedSegment>, EngineError> {
        let cell = self.slot_cell(device_name);
        let mut slot = cell.lock().unwrap();
        let slot = self.ensure_locked(device_name, &mut slot, Instant::now())?;

        if !slot.engine.accept_pcm(pcm)? {
            return Ok(None);
        }

        let payload = slot.engine.result()?;
        let text = extract_text(&payload)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        Ok(Some(FinalizedSegment {
            text: trimmed.to_owned(),
            timestamp: Local::now(),
            device_name: device_name.to_owned(),
            device_id: None,
        }))
    }

    /// Dispose every live recognizer and clear the pool.  Idempotent; safe
    /// to call on an empty pool.
    pub fn dispose_all(&self) {
        let cells: Vec<SlotCell> = self.slots.lock().unwrap().drain().map(|(_, c)| c).collect();
        for cell in cells {
            // Waits out any in-flight feed for the device, then drops the
            // engine.
            cell.lock().unwrap().take();
        }
    }

    /// Fetch or insert the slot cell for a device.  The map lock is released
    /// before the per-device cell is locked.
    fn slot_cell(&self, device_name: &str) -> SlotCell {
        let mut slots = self.slots.lock().unwrap();
        Arc::clone(slots.entry(device_name.to_owned()).or_default())
    }

    /// Apply the creation/reset policy with the device's slot lock held.
    fn ensure_locked<'a>(
        &self,
        device_name: &str,
        slot: &'a mut Option<Slot>,
        now: Instant,
    ) -> Result<&'a mut Slot, EngineError> {
        let due = match slot.as_ref() {
            Some(s) => now.saturating_duration_since(s.last_reset) > self.reset_interval,
            None => true,
        };

        if due {
            // Stale instance is disposed before the replacement is
            // installed; a device never has two live recognizers.  If
            // construction then fails the slot stays empty and the error
            // propagates — the next frame retries.
            drop(slot.take());
            let engine = self.factory.create()?;
            *slot = Some(Slot {
                engine,
                last_reset: now,
            });

            if let Err(e) = self
                .sink
                .start_new_session(device_name, &self.active_devices)
            {
                log::warn!("session header write failed for '{device_name}': {e}");
            }
        }

        match slot.as_mut() {
            Some(s) => Ok(s),
            None => Err(EngineError::EngineUnavailable(
                "recognizer slot empty after ensure".into(),
            )),
        }
    }
}

/// Pull the `"text"` field out of an engine result payload.  A missing field
/// maps to an empty string, which the caller suppresses.
fn extract_text(payload: &str) -> Result<String, EngineError> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| EngineError::Recognition(format!("malformed result payload: {e}")))?;
    Ok(value
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::MockEngineFactory;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const INTERVAL: Duration = Duration::from_secs(60);

    fn payload(text: &str) -> Option<String> {
        Some(format!("{{\"text\": \"{text}\"}}"))
    }

    fn pool_with(
        script: Vec<Option<String>>,
        devices: &[&str],
    ) -> (Arc<MockEngineFactory>, RecognizerPool, TempDir) {
        let dir = tempdir().expect("temp dir");
        let factory = Arc::new(MockEngineFactory::new(script));
        let sink = Arc::new(TranscriptSink::new(dir.path()));
        let pool = RecognizerPool::new(
            Arc::clone(&factory) as Arc<dyn EngineFactory>,
            sink,
            devices.iter().map(|d| d.to_string()).collect(),
            INTERVAL,
        );
        (factory, pool, dir)
    }

    fn device_file(dir: &TempDir, device: &str) -> String {
        fs::read_to_string(dir.path().join(format!("transcript_{device}.txt")))
            .unwrap_or_default()
    }

    fn header_count(dir: &TempDir, device: &str) -> usize {
        device_file(dir, device)
            .matches("=== New recording session")
            .count()
    }

    // --- lazy creation ---

    #[test]
    fn first_feed_creates_one_recognizer_and_one_header() {
        let (factory, pool, dir) = pool_with(vec![None, None], &["Mic A"]);

        pool.feed("Mic A", &[0; 160]).unwrap();
        pool.feed("Mic A", &[0; 160]).unwrap();

        assert_eq!(factory.created(), 1);
        assert_eq!(factory.live(), 1);
        assert_eq!(header_count(&dir, "Mic A"), 1);
    }

    #[test]
    fn ensure_within_interval_is_a_no_op() {
        let (factory, pool, dir) = pool_with(vec![], &["Mic A"]);
        let t0 = Instant::now();

        pool.ensure_recognizer("Mic A", t0).unwrap();
        pool.ensure_recognizer("Mic A", t0 + Duration::from_secs(59))
            .unwrap();

        assert_eq!(factory.created(), 1);
        assert_eq!(header_count(&dir, "Mic A"), 1);
    }

    // --- reset policy ---

    #[test]
    fn elapsed_interval_disposes_and_recreates_exactly_once() {
        let (factory, pool, dir) = pool_with(vec![], &["Mic A"]);
        let t0 = Instant::now();

        pool.ensure_recognizer("Mic A", t0).unwrap();
        pool.ensure_recognizer("Mic A", t0 + Duration::from_secs(61))
            .unwrap();

        assert_eq!(factory.created(), 2);
        // Stale instance was disposed before the replacement was installed.
        assert_eq!(factory.live(), 1);
        assert_eq!(header_count(&dir, "Mic A"), 2);
    }

    #[test]
    fn reset_with_no_text_yet_appends_header_before_next_line() {
        let (_factory, pool, dir) = pool_with(vec![payload("after reset")], &["Mic A"]);
        let t0 = Instant::now();

        pool.ensure_recognizer("Mic A", t0).unwrap();
        // Interval elapses with nothing recognized; recreate, then finalize.
        pool.ensure_recognizer("Mic A", t0 + Duration::from_secs(61))
            .unwrap();
        let segment = pool.feed("Mic A", &[0; 160]).unwrap().unwrap();

        let sink = TranscriptSink::new(dir.path());
        sink.append_transcription(&segment.device_name, &segment.text, segment.timestamp, None)
            .unwrap();

        let content = device_file(&dir, "Mic A");
        assert_eq!(content.matches("=== New recording session").count(), 2);
        let last_header = content.rfind("=== New recording session").unwrap();
        let line = content.rfind("after reset").unwrap();
        assert!(last_header < line);
    }

    // --- finalized-segment extraction ---

    #[test]
    fn non_empty_text_yields_trimmed_segment() {
        let (_factory, pool, _dir) = pool_with(vec![payload("  привет мир  ")], &["Mic A"]);

        let segment = pool.feed("Mic A", &[0; 160]).unwrap().unwrap();
        assert_eq!(segment.text, "привет мир");
        assert_eq!(segment.device_name, "Mic A");
        assert_eq!(segment.device_id, None);
    }

    #[test]
    fn whitespace_only_text_is_suppressed() {
        let (_factory, pool, _dir) = pool_with(vec![payload("   "), payload("")], &["Mic A"]);

        assert!(pool.feed("Mic A", &[0; 160]).unwrap().is_none());
        assert!(pool.feed("Mic A", &[0; 160]).unwrap().is_none());
    }

    #[test]
    fn missing_text_field_is_suppressed() {
        let (_factory, pool, _dir) =
            pool_with(vec![Some("{\"partial\": \"ignored\"}".into())], &["Mic A"]);

        assert!(pool.feed("Mic A", &[0; 160]).unwrap().is_none());
    }

    #[test]
    fn running_state_yields_nothing() {
        let (_factory, pool, _dir) = pool_with(vec![None, None, None], &["Mic A"]);

        for _ in 0..3 {
            assert!(pool.feed("Mic A", &[0; 160]).unwrap().is_none());
        }
    }

    // --- failure semantics ---

    #[test]
    fn construction_failure_propagates_and_leaves_slot_empty() {
        let (factory, pool, dir) = pool_with(vec![payload("ok")], &["Mic A"]);
        factory.set_fail(true);

        let err = pool.feed("Mic A", &[0; 160]).unwrap_err();
        assert!(matches!(err, EngineError::EngineUnavailable(_)));
        assert_eq!(header_count(&dir, "Mic A"), 0);

        // The device recovers once the factory does.
        factory.set_fail(false);
        let segment = pool.feed("Mic A", &[0; 160]).unwrap();
        assert_eq!(segment.unwrap().text, "ok");
        assert_eq!(header_count(&dir, "Mic A"), 1);
    }

    #[test]
    fn reset_failure_disposes_stale_and_retries_next_time() {
        let (factory, pool, dir) = pool_with(vec![], &["Mic A"]);
        let t0 = Instant::now();

        pool.ensure_recognizer("Mic A", t0).unwrap();
        factory.set_fail(true);

        let err = pool
            .ensure_recognizer("Mic A", t0 + Duration::from_secs(61))
            .unwrap_err();
        assert!(matches!(err, EngineError::EngineUnavailable(_)));
        // The stale instance was disposed and nothing replaced it: the slot
        // is empty, never half-initialised, and no header was written.
        assert_eq!(factory.live(), 0);
        assert_eq!(factory.created(), 1);
        assert_eq!(header_count(&dir, "Mic A"), 1);

        // The device recovers on the next attempt.
        factory.set_fail(false);
        pool.ensure_recognizer("Mic A", t0 + Duration::from_secs(61))
            .unwrap();
        assert_eq!(factory.created(), 2);
        assert_eq!(factory.live(), 1);
        assert_eq!(header_count(&dir, "Mic A"), 2);
    }

    // --- multi-device isolation ---

    #[test]
    fn devices_get_independent_recognizers_and_headers() {
        let (factory, pool, dir) = pool_with(vec![], &["Mic A", "Mic B"]);

        pool.feed("Mic A", &[0; 160]).unwrap();
        pool.feed("Mic B", &[0; 160]).unwrap();
        pool.feed("Mic A", &[0; 160]).unwrap();

        assert_eq!(factory.created(), 2);
        assert_eq!(header_count(&dir, "Mic A"), 1);
        assert_eq!(header_count(&dir, "Mic B"), 1);

        // Both headers list both active microphones.
        let content = device_file(&dir, "Mic B");
        assert!(content.contains("[1] - Mic A"));
        assert!(content.contains("[2] - Mic B"));
    }

    // --- disposal ---

    #[test]
    fn dispose_all_drops_every_engine_and_is_idempotent() {
        let (factory, pool, _dir) = pool_with(vec![], &["Mic A", "Mic B"]);

        pool.feed("Mic A", &[0; 160]).unwrap();
        pool.feed("Mic B", &[0; 160]).unwrap();
        assert_eq!(factory.live(), 2);

        pool.dispose_all();
        assert_eq!(factory.live(), 0);

        // Second call is a no-op: no error, no double-free.
        pool.dispose_all();
        assert_eq!(factory.live(), 0);
        assert_eq!(factory.created(), 2);
    }

    #[test]
    fn dispose_all_on_empty_pool_is_safe() {
        let (_factory, pool, _dir) = pool_with(vec![], &[]);
        pool.dispose_all();
    }

    #[test]
    fn feed_after_dispose_recreates() {
        let (factory, pool, dir) = pool_with(vec![], &["Mic A"]);

        pool.feed("Mic A", &[0; 160]).unwrap();
        pool.dispose_all();
        pool.feed("Mic A", &[0; 160]).unwrap();

        assert_eq!(factory.created(), 2);
        assert_eq!(factory.live(), 1);
        assert_eq!(header_count(&dir, "Mic A"), 2);
    }

    // --- payload parsing ---

    #[test]
    fn malformed_payload_is_a_recognition_error() {
        let (_factory, pool, _dir) = pool_with(vec![Some("not json".into())], &["Mic A"]);

        let err = pool.feed("Mic A", &[0; 160]).unwrap_err();
        assert!(matches!(err, EngineError::Recognition(_)));
    }
}
