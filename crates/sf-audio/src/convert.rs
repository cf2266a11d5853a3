//! Channel-layout and sample-rate conversion
//!
//! Separation models are trained for a fixed layout (typically stereo at
//! 44.1 kHz); decoded files come in whatever layout the source material used.
//! `conform` bridges the two.

use ndarray::{s, Array2, Axis};

use sf_core::Waveform;

use crate::error::{AudioError, AudioResult};

/// Convert a waveform to the given channel count and sample rate.
///
/// Channel rules: mono targets get the mean downmix, mono sources are
/// replicated, extra source channels are dropped from the end. Upmixing a
/// multi-channel source to more channels is refused. Rate conversion is
/// linear interpolation.
pub fn conform(wav: &Waveform, sample_rate: u32, channels: usize) -> AudioResult<Waveform> {
    let mut out = convert_channels(wav, channels)?;
    if out.sample_rate != sample_rate {
        log::debug!(
            "resampling from {} Hz to {} Hz",
            out.sample_rate,
            sample_rate
        );
        out = resample(&out, sample_rate);
    }
    Ok(out)
}

/// Adjust the channel count without touching the sample rate
pub fn convert_channels(wav: &Waveform, channels: usize) -> AudioResult<Waveform> {
    let src = wav.channels();
    if channels == 0 || wav.is_empty() {
        return Err(AudioError::ChannelConversion { from: src, to: channels });
    }

    let data = if src == channels {
        wav.data.clone()
    } else if channels == 1 {
        wav.to_mono().insert_axis(Axis(0))
    } else if src == 1 {
        let mut data = Array2::zeros((channels, wav.len()));
        for ch in 0..channels {
            data.slice_mut(s![ch, ..]).assign(&wav.data.slice(s![0, ..]));
        }
        data
    } else if src > channels {
        wav.data.slice(s![..channels, ..]).to_owned()
    } else {
        return Err(AudioError::ChannelConversion { from: src, to: channels });
    };

    Ok(Waveform::new(data, wav.sample_rate))
}

/// Linear-interpolation resampling
pub fn resample(wav: &Waveform, sample_rate: u32) -> Waveform {
    if wav.sample_rate == sample_rate || wav.is_empty() {
        return Waveform::new(wav.data.clone(), sample_rate);
    }

    let ratio = sample_rate as f64 / wav.sample_rate as f64;
    let src_len = wav.len();
    let dst_len = ((src_len as f64) * ratio).round().max(1.0) as usize;
    let channels = wav.channels();

    let mut out = Array2::<f32>::zeros((channels, dst_len));
    for ch in 0..channels {
        for i in 0..dst_len {
            let pos = i as f64 / ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let s0 = wav.data[[ch, idx.min(src_len - 1)]];
            let s1 = wav.data[[ch, (idx + 1).min(src_len - 1)]];
            out[[ch, i]] = s0 + (s1 - s0) * frac;
        }
    }

    Waveform::new(out, sample_rate)
}
