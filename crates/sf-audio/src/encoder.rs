//! WAV output
//!
//! Separated stems are written as WAV through hound. Clipping is handled
//! before quantization: separation commonly produces peaks slightly above
//! full scale, and silently wrapping those would be worse than any policy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sf_core::Waveform;

use crate::error::{AudioError, AudioResult};

/// What to do with samples outside `[-1, 1]` before quantization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipPolicy {
    /// Scale the whole signal down so the peak fits
    #[default]
    Rescale,
    /// Hard-clamp each sample to `[-0.99, 0.99]`
    Clamp,
    /// Leave samples untouched (float output only)
    None,
}

/// WAV writer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WavOutput {
    /// Output bit depth, one of 16, 24 or 32
    pub bits_per_sample: u16,
    /// Write 32-bit float instead of integer PCM
    pub float: bool,
    /// Out-of-range handling applied before writing
    pub clip: ClipPolicy,
}

impl Default for WavOutput {
    fn default() -> Self {
        Self {
            bits_per_sample: 16,
            float: false,
            clip: ClipPolicy::Rescale,
        }
    }
}

impl WavOutput {
    fn validate(&self) -> AudioResult<()> {
        if !matches!(self.bits_per_sample, 16 | 24 | 32) {
            return Err(AudioError::ConfigError(format!(
                "unsupported bit depth: {}",
                self.bits_per_sample
            )));
        }
        if self.float && self.bits_per_sample != 32 {
            return Err(AudioError::ConfigError(
                "float output requires 32 bits per sample".to_string(),
            ));
        }
        if self.clip == ClipPolicy::None && !self.float {
            return Err(AudioError::ConfigError(
                "integer output cannot skip clip handling".to_string(),
            ));
        }
        Ok(())
    }
}

/// Write a waveform to a WAV file
pub fn save_waveform(wav: &Waveform, path: &Path, output: &WavOutput) -> AudioResult<()> {
    output.validate()?;

    let samples = apply_clip_policy(wav.to_interleaved(), output.clip);

    let spec = hound::WavSpec {
        channels: wav.channels() as u16,
        sample_rate: wav.sample_rate,
        bits_per_sample: output.bits_per_sample,
        sample_format: if output.float {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| AudioError::WriteError(e.to_string()))?;

    match (output.float, output.bits_per_sample) {
        (true, _) => {
            for &sample in &samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| AudioError::WriteError(e.to_string()))?;
            }
        }
        (false, 16) => {
            for &sample in &samples {
                let s = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                writer
                    .write_sample(s)
                    .map_err(|e| AudioError::WriteError(e.to_string()))?;
            }
        }
        (false, 24) => {
            for &sample in &samples {
                let s = (sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32;
                writer
                    .write_sample(s)
                    .map_err(|e| AudioError::WriteError(e.to_string()))?;
            }
        }
        (false, _) => {
            for &sample in &samples {
                let s = (sample.clamp(-1.0, 1.0) * 2_147_483_647.0) as i32;
                writer
                    .write_sample(s)
                    .map_err(|e| AudioError::WriteError(e.to_string()))?;
            }
        }
    }

    writer
        .finalize()
        .map_err(|e| AudioError::WriteError(e.to_string()))?;

    log::debug!("wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}

fn apply_clip_policy(mut samples: Vec<f32>, clip: ClipPolicy) -> Vec<f32> {
    match clip {
        ClipPolicy::Rescale => {
            let peak = samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
            // 1% headroom below full scale, untouched when already in range
            let divisor = (1.01 * peak).max(1.0);
            if divisor > 1.0 {
                for s in &mut samples {
                    *s /= divisor;
                }
            }
            samples
        }
        ClipPolicy::Clamp => {
            for s in &mut samples {
                *s = s.clamp(-0.99, 0.99);
            }
            samples
        }
        ClipPolicy::None => samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rescale_preserves_in_range_signal() {
        let samples = vec![0.5, -0.5, 0.25];
        let out = apply_clip_policy(samples.clone(), ClipPolicy::Rescale);
        assert_eq!(out, samples);
    }

    #[test]
    fn test_rescale_brings_peak_under_full_scale() {
        let out = apply_clip_policy(vec![2.0, -1.0, 0.5], ClipPolicy::Rescale);
        let peak = out.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        assert!(peak < 1.0);
        // relative balance is preserved
        assert_relative_eq!(out[0] / out[2], 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_clamp_limits_each_sample() {
        let out = apply_clip_policy(vec![2.0, -3.0, 0.5], ClipPolicy::Clamp);
        assert_relative_eq!(out[0], 0.99);
        assert_relative_eq!(out[1], -0.99);
        assert_relative_eq!(out[2], 0.5);
    }

    #[test]
    fn test_float_requires_32_bits() {
        let output = WavOutput {
            bits_per_sample: 16,
            float: true,
            clip: ClipPolicy::None,
        };
        assert!(output.validate().is_err());
    }

    #[test]
    fn test_integer_output_refuses_clip_none() {
        let output = WavOutput {
            bits_per_sample: 16,
            float: false,
            clip: ClipPolicy::None,
        };
        assert!(output.validate().is_err());
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stem.wav");

        let wav = Waveform::from_interleaved(&[0.5, -0.5, 0.25, -0.25], 2, 44100);
        let output = WavOutput {
            bits_per_sample: 32,
            float: true,
            clip: ClipPolicy::None,
        };
        save_waveform(&wav, &path, &output).unwrap();

        let back = crate::decoder::load_audio(&path).unwrap();
        assert_eq!(back.channels(), 2);
        assert_eq!(back.sample_rate, 44100);
        for (a, b) in back.data.iter().zip(wav.data.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_16_bit_round_trip_within_quantization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stem16.wav");

        let wav = Waveform::from_interleaved(&[0.5, -0.5, 0.125, -0.125], 2, 48000);
        save_waveform(&wav, &path, &WavOutput::default()).unwrap();

        let back = crate::decoder::load_audio(&path).unwrap();
        for (a, b) in back.data.iter().zip(wav.data.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-3);
        }
    }
}
