//! Multi-channel waveform buffer

use ndarray::{Array1, Array2, Axis};

/// Multi-channel sample buffer, laid out as `[channels, samples]`.
///
/// Immutable once handed to the separation core; every separated source is
/// returned as a fresh `Waveform`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Planar sample data, one row per channel
    pub data: Array2<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    /// Create a waveform from planar data
    pub fn new(data: Array2<f32>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    /// Create a silent waveform
    pub fn silent(channels: usize, samples: usize, sample_rate: u32) -> Self {
        Self::new(Array2::zeros((channels, samples)), sample_rate)
    }

    /// Build a waveform from interleaved samples
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Self {
        let frames = if channels == 0 { 0 } else { samples.len() / channels };
        let mut data = Array2::<f32>::zeros((channels, frames));
        for frame in 0..frames {
            for ch in 0..channels {
                data[[ch, frame]] = samples[frame * channels + ch];
            }
        }
        Self::new(data, sample_rate)
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples per channel
    pub fn len(&self) -> usize {
        self.data.ncols()
    }

    /// True if the waveform holds no samples
    pub fn is_empty(&self) -> bool {
        self.data.ncols() == 0 || self.data.nrows() == 0
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Interleave channels for file output
    pub fn to_interleaved(&self) -> Vec<f32> {
        let (channels, frames) = self.data.dim();
        let mut out = Vec::with_capacity(channels * frames);
        for frame in 0..frames {
            for ch in 0..channels {
                out.push(self.data[[ch, frame]]);
            }
        }
        out
    }

    /// Mono downmix (mean across channels)
    pub fn to_mono(&self) -> Array1<f32> {
        self.data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave_round_trip() {
        let interleaved = vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let wav = Waveform::from_interleaved(&interleaved, 2, 44100);

        assert_eq!(wav.channels(), 2);
        assert_eq!(wav.len(), 3);
        assert_eq!(wav.data[[0, 1]], 0.2);
        assert_eq!(wav.data[[1, 2]], -0.3);
        assert_eq!(wav.to_interleaved(), interleaved);
    }

    #[test]
    fn test_mono_downmix() {
        let wav = Waveform::from_interleaved(&[1.0, 0.0, 0.5, 0.5], 2, 48000);
        let mono = wav.to_mono();

        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 1e-6);
        assert!((mono[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_duration() {
        let wav = Waveform::silent(2, 44100, 44100);
        assert!((wav.duration() - 1.0).abs() < 1e-9);
    }
}
