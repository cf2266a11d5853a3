//! Zero-mean/unit-variance conditioning
//!
//! Inference runs on a normalized copy of the input; the inverse affine
//! transform restores every separated source (and the caller-visible
//! reference copy) to the original scale.

use ndarray::Array2;

use crate::waveform::Waveform;

/// Guards the divisor against near-silent input
pub const NORM_EPSILON: f32 = 1e-8;

/// Affine normalization derived from a mono reference of the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    /// Mean of the mono reference
    pub mean: f32,
    /// Standard deviation of the mono reference
    pub std: f32,
}

impl Normalizer {
    /// Derive normalization statistics from the waveform's mono downmix
    pub fn from_waveform(wav: &Waveform) -> Self {
        let mono = wav.to_mono();
        let n = mono.len();
        if n == 0 {
            return Self { mean: 0.0, std: 0.0 };
        }

        let mean = mono.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        let std = if n > 1 {
            let var = mono
                .iter()
                .map(|&v| {
                    let d = v as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };

        Self {
            mean: mean as f32,
            std: std as f32,
        }
    }

    /// Subtract the mean and divide by `std + epsilon`, in place
    pub fn forward(&self, data: &mut Array2<f32>) {
        let scale = self.std + NORM_EPSILON;
        data.mapv_inplace(|v| (v - self.mean) / scale);
    }

    /// Exact inverse of [`Normalizer::forward`], in place
    pub fn inverse(&self, data: &mut Array2<f32>) {
        let scale = self.std + NORM_EPSILON;
        data.mapv_inplace(|v| v * scale + self.mean);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_round_trip_restores_waveform() {
        let data = Array2::from_shape_fn((2, 500), |(ch, i)| {
            0.3 + 0.7 * ((i as f32 * 0.05).sin() + ch as f32 * 0.1)
        });
        let wav = Waveform::new(data.clone(), 44100);

        let norm = Normalizer::from_waveform(&wav);
        let mut work = data.clone();
        norm.forward(&mut work);
        norm.inverse(&mut work);

        for (a, b) in work.iter().zip(data.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_forward_centers_the_reference() {
        let data = Array2::from_shape_fn((1, 1000), |(_, i)| 1.0 + (i as f32 * 0.01).cos());
        let wav = Waveform::new(data.clone(), 44100);

        let norm = Normalizer::from_waveform(&wav);
        let mut work = data;
        norm.forward(&mut work);

        let mean: f32 = work.iter().sum::<f32>() / work.len() as f32;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_silent_input_does_not_divide_by_zero() {
        let wav = Waveform::silent(2, 100, 44100);
        let norm = Normalizer::from_waveform(&wav);
        assert_eq!(norm.mean, 0.0);
        assert_eq!(norm.std, 0.0);

        let mut work = wav.data.clone();
        norm.forward(&mut work);
        assert!(work.iter().all(|v| v.is_finite()));
    }
}
