//! # StemForge Audio I/O
//!
//! Decode, layout conversion and stem output for the separation pipeline:
//! - Decoding: symphonia (WAV, FLAC, MP3, OGG Vorbis) with a hound WAV
//!   fallback; both failing yields one aggregated error
//! - Conversion: channel up/down-mix and linear resampling to whatever
//!   layout the model expects
//! - Encoding: hound WAV writer with bit-depth, float and clip policies

mod convert;
mod decoder;
mod encoder;
mod error;

pub use convert::{conform, convert_channels, resample};
pub use decoder::{load_audio, supported_formats};
pub use encoder::{save_waveform, ClipPolicy, WavOutput};
pub use error::{AudioError, AudioResult};
