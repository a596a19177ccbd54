//! Multi-device microphone capture via `cpal`.
//!
//! [`MicrophoneCapture`] wraps device enumeration, selection and the
//! per-device cpal stream lifecycle.  Every selected device gets its own
//! 16 kHz mono S16LE input stream whose callback fans out into one shared
//! [`FrameCallback`] tagged with the device name and ordinal id.  cpal
//! invokes each device's callback serially, so per-device chunk order is
//! preserved; distinct devices deliver concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

/// Fixed capture format: 16 kHz mono signed 16-bit PCM, matching what the
/// recognition engine expects.  No resampling is performed.
pub const SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// SelectedDevice
// ---------------------------------------------------------------------------

/// One capture device participating in the session.
///
/// `name` is the routing key for recognizer slots and transcript files;
/// `id` is the 1-based ordinal assigned at selection time and stays stable
/// for the session.  The enumeration index is kept as a positional fallback
/// for re-resolution at capture start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedDevice {
    pub name: String,
    pub id: u32,
    list_index: usize,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while enumerating devices or running capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input devices found on the default audio host")]
    NoDevice,

    #[error("invalid device selection: {0}")]
    InvalidSelection(String),

    #[error("no audio callback registered before start")]
    MissingCallback,

    #[error("device '{0}' does not support 16 kHz mono 16-bit capture")]
    UnsupportedFormat(String),

    #[error("device enumeration failed: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("failed to query supported stream configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// Frame callback
// ---------------------------------------------------------------------------

/// Invoked as `(pcm, device_name, device_id)` once per delivered chunk.
///
/// Runs on the device's cpal callback thread and must never panic.
pub type FrameCallback = Arc<dyn Fn(&[i16], &str, u32) + Send + Sync>;

// ---------------------------------------------------------------------------
// Enumeration and selection parsing
// ---------------------------------------------------------------------------

/// Display names of all capture devices on the default host, sorted.
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.input_devices()? {
        names.push(device.name()?);
    }
    if names.is_empty() {
        return Err(CaptureError::NoDevice);
    }
    names.sort();
    Ok(names)
}

/// Parse a comma-separated list of 1-based device numbers against a list of
/// `available` devices, preserving input order and dropping duplicates.
///
/// # Errors
///
/// [`CaptureError::InvalidSelection`] when the input is empty, a token is
/// not a number, or a number is out of range — in that case no devices are
/// initialised and the caller should re-prompt.
pub fn parse_selection(input: &str, available: usize) -> Result<Vec<usize>, CaptureError> {
    let mut indices = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let number: usize = token
            .parse()
            .map_err(|_| CaptureError::InvalidSelection(format!("'{token}' is not a number")))?;
        if number == 0 || number > available {
            return Err(CaptureError::InvalidSelection(format!(
                "device number {number} is out of range (1-{available})"
            )));
        }
        let index = number - 1;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }
    if indices.is_empty() {
        return Err(CaptureError::InvalidSelection(
            "no devices selected".into(),
        ));
    }
    Ok(indices)
}

/// Find the enumeration index for `name`, matching the way display names and
/// driver names partially contain each other across backends.  Falls back to
/// `fallback` (the index recorded at selection time) with a warning when no
/// name matches.
fn match_device_index(names: &[String], target: &str, fallback: usize) -> Option<usize> {
    let matched = names
        .iter()
        .position(|n| n == target || n.contains(target) || target.contains(n.as_str()));
    match matched {
        Some(i) => Some(i),
        None if fallback < names.len() => {
            log::warn!(
                "device '{target}' not matched by name; falling back to positional index {fallback}"
            );
            Some(fallback)
        }
        None => None,
    }
}

// ---------------------------------------------------------------------------
// MicrophoneCapture
// ---------------------------------------------------------------------------

/// Owns the selected devices and their live cpal streams.
///
/// `cpal::Stream` is not `Send`, so the whole struct lives on the thread
/// that starts recording (the menu thread); audio flows on cpal's own
/// callback threads regardless.
pub struct MicrophoneCapture {
    devices: Vec<SelectedDevice>,
    multi_mode: bool,
    callback: Option<FrameCallback>,
    streams: Vec<cpal::Stream>,
    running: Arc<AtomicBool>,
}

impl Default for MicrophoneCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrophoneCapture {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            multi_mode: false,
            callback: None,
            streams: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the current selection with the devices at `indices` into
    /// `available` (as returned by [`list_input_devices`]).  Duplicate
    /// display names collapse into one entry, since the name is the routing
    /// key for recognizers and transcript files.
    pub fn select(
        &mut self,
        indices: &[usize],
        available: &[String],
        multi_mode: bool,
    ) -> Result<(), CaptureError> {
        self.stop();
        self.devices.clear();
        self.multi_mode = multi_mode;

        for &index in indices {
            let name = available
                .get(index)
                .ok_or_else(|| {
                    CaptureError::InvalidSelection(format!("device index {index} out of range"))
                })?
                .clone();
            if self.devices.iter().any(|d| d.name == name) {
                log::warn!("duplicate device name '{name}' ignored; names must be unique");
                continue;
            }
            let id = self.devices.len() as u32 + 1;
            self.devices.push(SelectedDevice {
                name,
                id,
                list_index: index,
            });
        }
        Ok(())
    }

    /// Whether any devices are selected.
    pub fn is_initialized(&self) -> bool {
        !self.devices.is_empty()
    }

    pub fn is_multi_mode(&self) -> bool {
        self.multi_mode
    }

    pub fn is_recording(&self) -> bool {
        !self.streams.is_empty()
    }

    /// Selected device names in id order.
    pub fn device_names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    pub fn selected_devices(&self) -> &[SelectedDevice] {
        &self.devices
    }

    /// Register the audio-delivery callback used by subsequent
    /// [`start`](Self::start) calls.
    pub fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.callback = Some(callback);
    }

    /// Open one input stream per selected device and start capturing.
    ///
    /// A device that fails to resolve, configure or start is skipped with a
    /// warning — a broken microphone never takes the others down.  Returns
    /// the number of streams actually started.
    pub fn start(&mut self) -> Result<usize, CaptureError> {
        if self.is_recording() {
            return Ok(self.streams.len());
        }
        let callback = self.callback.clone().ok_or(CaptureError::MissingCallback)?;

        let host = cpal::default_host();
        let cpal_devices: Vec<cpal::Device> = host.input_devices()?.collect();
        let mut names = Vec::with_capacity(cpal_devices.len());
        for device in &cpal_devices {
            names.push(device.name()?);
        }

        self.running.store(true, Ordering::SeqCst);

        for selected in &self.devices {
            let Some(index) = match_device_index(&names, &selected.name, selected.list_index)
            else {
                log::warn!("device '{}' no longer present; skipping", selected.name);
                continue;
            };
            match build_stream(
                &cpal_devices[index],
                selected,
                Arc::clone(&callback),
                Arc::clone(&self.running),
            ) {
                Ok(stream) => {
                    log::info!("capture started on '{}' (id {})", selected.name, selected.id);
                    self.streams.push(stream);
                }
                Err(e) => {
                    log::warn!("failed to start capture on '{}': {e}", selected.name);
                }
            }
        }

        if self.streams.is_empty() {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(self.streams.len())
    }

    /// Stop capturing: gate the callbacks, then drop the streams.  No
    /// further audio is forwarded after this returns; segments already being
    /// finalized on a callback thread are unaffected.  Safe to call when
    /// recording never started.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.streams.clear();
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build and play the 16 kHz mono S16LE input stream for one device.
fn build_stream(
    device: &cpal::Device,
    selected: &SelectedDevice,
    callback: FrameCallback,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream, CaptureError> {
    let config = input_config_for(device, &selected.name)?;
    let name = selected.name.clone();
    let id = selected.id;

    let stream = device.build_input_stream(
        &config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            callback(data, &name, id);
        },
        |err: cpal::StreamError| {
            log::error!("input stream error: {err}");
        },
        None,
    )?;

    stream.play()?;
    Ok(stream)
}

/// Pick a supported config delivering the fixed capture format.
fn input_config_for(
    device: &cpal::Device,
    display_name: &str,
) -> Result<cpal::StreamConfig, CaptureError> {
    let supported = device.supported_input_configs()?.find(|c| {
        c.channels() == 1
            && c.sample_format() == cpal::SampleFormat::I16
            && c.min_sample_rate().0 <= SAMPLE_RATE
            && c.max_sample_rate().0 >= SAMPLE_RATE
    });

    match supported {
        Some(config) => Ok(config.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)).into()),
        None => Err(CaptureError::UnsupportedFormat(display_name.to_owned())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
