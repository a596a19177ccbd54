//! Audio capture — device enumeration, selection and per-device cpal
//! streams feeding the pipeline dispatcher.

pub mod capture;

pub use capture::{
    list_input_devices, parse_selection, CaptureError, FrameCallback, MicrophoneCapture,
    SelectedDevice, SAMPLE_RATE,
};
