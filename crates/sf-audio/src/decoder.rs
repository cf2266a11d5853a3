//! Audio decoding
//!
//! Symphonia is the primary backend (WAV, FLAC, MP3, OGG Vorbis); a hound
//! WAV reader serves as the fallback. When both fail the caller gets a
//! single error carrying each backend's reason.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use sf_core::Waveform;

use crate::error::{AudioError, AudioResult};

/// Decode an audio file into a planar waveform.
///
/// Tries symphonia first; if the probe or decode fails, retries the file as
/// plain WAV through hound before giving up.
pub fn load_audio(path: &Path) -> AudioResult<Waveform> {
    if !path.exists() {
        return Err(AudioError::InputNotFound(path.display().to_string()));
    }

    let symphonia_err = match decode_symphonia(path) {
        Ok(wav) => return Ok(wav),
        Err(e) => e,
    };
    log::debug!(
        "symphonia failed for {}, trying wav fallback: {symphonia_err}",
        path.display()
    );

    match decode_wav(path) {
        Ok(wav) => Ok(wav),
        Err(wav_err) => Err(AudioError::AllBackendsFailed {
            path: path.display().to_string(),
            symphonia: symphonia_err.to_string(),
            wav: wav_err,
        }),
    }
}

fn decode_symphonia(path: &Path) -> AudioResult<Waveform> {
    let file = File::open(path)
        .map_err(|e| AudioError::ReadError(format!("failed to open file: {e}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::ReadError(format!("failed to probe format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::ReadError("no audio track found".to_string()))?;
    let track_id = track.id;

    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params.sample_rate.unwrap_or(44100);
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::ReadError(format!("failed to create decoder: {e}")))?;

    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                match decoder.decode(&packet) {
                    Ok(decoded) => append_samples(&decoded, channels, &mut interleaved),
                    // corrupt packets are skipped, not fatal
                    Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                    Err(e) => {
                        return Err(AudioError::ReadError(format!("decode error: {e}")));
                    }
                }
            }
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(AudioError::ReadError(format!("packet read error: {e}")));
            }
        }
    }

    if interleaved.is_empty() {
        return Err(AudioError::ReadError("stream decoded to zero samples".to_string()));
    }

    Ok(Waveform::from_interleaved(&interleaved, channels, sample_rate))
}

fn append_samples(decoded: &AudioBufferRef, channels: usize, output: &mut Vec<f32>) {
    macro_rules! interleave {
        ($buf:expr, $convert:expr) => {{
            let planes = $buf.planes();
            let frames = $buf.frames();
            for frame in 0..frames {
                for ch in 0..channels.min(planes.planes().len()) {
                    output.push($convert(planes.planes()[ch][frame]));
                }
            }
        }};
    }

    match decoded {
        AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
        AudioBufferRef::F64(buf) => interleave!(buf, |s: f64| s as f32),
        AudioBufferRef::S8(buf) => interleave!(buf, |s: i8| s as f32 / 128.0),
        AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => {
            interleave!(buf, |s: symphonia::core::sample::i24| s.inner() as f32 / 8_388_608.0)
        }
        AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / 2_147_483_648.0),
        AudioBufferRef::U8(buf) => interleave!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        AudioBufferRef::U16(buf) => {
            interleave!(buf, |s: u16| (s as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(buf) => {
            interleave!(buf, |s: symphonia::core::sample::u24| {
                (s.inner() as f32 - 8_388_608.0) / 8_388_608.0
            })
        }
        AudioBufferRef::U32(buf) => {
            interleave!(buf, |s: u32| (s as f32 - 2_147_483_648.0) / 2_147_483_648.0)
        }
    }
}

/// WAV fallback through hound, returning the failure as a plain string so it
/// can be aggregated with the symphonia reason.
fn decode_wav(path: &Path) -> Result<Waveform, String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| e.to_string())?
        }
    };

    if interleaved.is_empty() {
        return Err("wav file contains no samples".to_string());
    }

    Ok(Waveform::from_interleaved(&interleaved, channels, spec.sample_rate))
}

/// File extensions the decoder accepts
pub fn supported_formats() -> &'static [&'static str] {
    &["wav", "flac", "mp3", "ogg"]
}
