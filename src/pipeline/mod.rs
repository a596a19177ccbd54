//! Streaming recognition pipeline.
//!
//! ```text
//! capture callback (per device)
//!   └─▶ PipelineDispatcher::on_audio_frame
//!         └─▶ RecognizerPool::feed  (ensure → accept_pcm → result)
//!               └─▶ FinalizedSegment ─▶ TranscriptSink
//! ```
//!
//! The pool owns every recognizer instance; the dispatcher owns the routing
//! and error-isolation policy.  Both support concurrent invocation across
//! distinct device names while serializing all work per device.

pub mod dispatcher;
pub mod pool;

pub use dispatcher::{PipelineDispatcher, SegmentObserver};
pub use pool::{FinalizedSegment, RecognizerPool, DEFAULT_RESET_INTERVAL};
