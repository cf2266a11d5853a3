//! Randomized shift averaging
//!
//! The model is only approximately time-shift-equivariant. Running the same
//! chunk several times under random temporal offsets and undoing the offset
//! on each output averages away shift-dependent artifacts, at the cost of
//! one forward pass per shift.

use ndarray::{s, Array2, Array3, ArrayView2};
use rand::Rng;

use crate::config::DeviceGuard;
use crate::error::{SepError, SepResult};
use crate::model::Model;
use crate::progress::{Emitter, ProgressState};

/// Maximum random shift as a fraction of one second of model sample rate
pub const MAX_SHIFT_SECONDS: f32 = 0.5;

/// Run `shifts` randomized-offset forward passes over one chunk and average.
///
/// With `shifts == 0` the chunk goes through the model once, unshifted, and
/// the result is returned unmodified. Each forward pass is bracketed by
/// `start`/`end` checkpoints carrying the shift index.
pub(crate) fn shift_average(
    model: &dyn Model,
    guard: &DeviceGuard,
    mix: ArrayView2<'_, f32>,
    shifts: usize,
    emitter: &Emitter<'_>,
    segment_offset: usize,
) -> SepResult<Array3<f32>> {
    let (channels, length) = mix.dim();
    let n_sources = model.sources().len();

    if shifts == 0 {
        emitter.checkpoint(segment_offset, 0, ProgressState::Start)?;
        let out = guard.run(|| model.forward(mix))?;
        emitter.checkpoint(segment_offset, 0, ProgressState::End)?;
        check_shape(&out, n_sources, channels, length)?;
        return Ok(out);
    }

    let max_shift = ((model.sample_rate() as f32 * MAX_SHIFT_SECONDS) as usize).max(1);

    // Zero-pad by max_shift on both sides; each pass sees a window of
    // length + max_shift samples starting at the drawn offset.
    let mut padded = Array2::<f32>::zeros((channels, length + 2 * max_shift));
    padded
        .slice_mut(s![.., max_shift..max_shift + length])
        .assign(&mix);

    let mut rng = rand::rng();
    let mut acc = Array3::<f32>::zeros((n_sources, channels, length));

    for shift_idx in 0..shifts {
        let offset = rng.random_range(0..max_shift);

        emitter.checkpoint(segment_offset, shift_idx, ProgressState::Start)?;
        let shifted = padded.slice(s![.., offset..offset + length + max_shift]);
        let out = guard.run(|| model.forward(shifted))?;
        emitter.checkpoint(segment_offset, shift_idx, ProgressState::End)?;

        check_shape(&out, n_sources, channels, length + max_shift)?;

        // Inverse alignment: the original chunk sits max_shift - offset
        // samples into the shifted window.
        let back = max_shift - offset;
        acc += &out.slice(s![.., .., back..back + length]);
    }

    acc.mapv_inplace(|v| v / shifts as f32);
    Ok(acc)
}

fn check_shape(
    out: &Array3<f32>,
    sources: usize,
    channels: usize,
    samples: usize,
) -> SepResult<()> {
    if out.dim() != (sources, channels, samples) {
        return Err(SepError::InvalidOutputShape {
            expected: format!("[{sources}, {channels}, {samples}]"),
            got: format!("{:?}", out.dim()),
        });
    }
    Ok(())
}
