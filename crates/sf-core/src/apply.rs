//! Model application
//!
//! Drives a [`ModelSpec`] over a full-length waveform: per-member windowing,
//! randomized shift averaging per segment, optional worker-pool dispatch,
//! weighted overlap-add reconstruction and weighted ensemble combination.
//! Cancellation is cooperative: the progress callback is consulted at every
//! checkpoint and an abort surfaces as a `Cancelled` outcome, never as a
//! silently truncated buffer.

use std::collections::BTreeMap;

use ndarray::{s, Array2, Array3, ArrayView2};
use rayon::prelude::*;

use crate::config::{ApplyConfig, DeviceGuard};
use crate::error::{SepError, SepResult};
use crate::model::{BagOfModels, Model, ModelSpec};
use crate::normalize::Normalizer;
use crate::progress::{Emitter, ProgressHandler, ProgressState};
use crate::shifts::shift_average;
use crate::waveform::Waveform;
use crate::window::{plan_segments, OverlapAdd, Segment};

/// Result of [`apply_model`]
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// Per-source outputs, `[sources, channels, samples]`
    Separated(Array3<f32>),
    /// The progress callback requested an abort
    Cancelled,
}

/// Result of [`separate`]
#[derive(Debug, Clone)]
pub enum SeparationOutcome {
    /// Separation ran to completion
    Separated {
        /// Original-scale reference copy of the input
        original: Waveform,
        /// Separated stems keyed by source name
        stems: BTreeMap<String, Waveform>,
    },
    /// The progress callback requested an abort
    Cancelled,
}

impl SeparationOutcome {
    /// True if the operation was aborted by the callback
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SeparationOutcome::Cancelled)
    }
}

/// Apply a model over a waveform without normalization conditioning.
///
/// Returns the raw `[sources, channels, samples]` tensor. Most callers want
/// [`separate`], which wraps this in zero-mean/unit-variance conditioning and
/// returns named stems.
pub fn apply_model(
    model: &ModelSpec,
    wav: &Waveform,
    config: &ApplyConfig,
    progress: Option<&ProgressHandler>,
) -> SepResult<ApplyOutcome> {
    match apply_inner(model, wav.data.view(), config, progress) {
        Ok(out) => Ok(ApplyOutcome::Separated(out)),
        Err(SepError::Cancelled) => Ok(ApplyOutcome::Cancelled),
        Err(e) => Err(e),
    }
}

/// Separate a waveform into named stems.
///
/// The input is conditioned to zero mean and unit variance before inference
/// and every output (plus the returned reference copy) is restored to the
/// original scale afterwards. The waveform must already match the model's
/// sample rate and channel count.
pub fn separate(
    model: &ModelSpec,
    wav: &Waveform,
    config: &ApplyConfig,
    progress: Option<&ProgressHandler>,
) -> SepResult<SeparationOutcome> {
    if wav.is_empty() {
        return Err(SepError::Config("cannot separate empty audio".into()));
    }
    if wav.channels() != model.audio_channels() {
        return Err(SepError::Config(format!(
            "model expects {} channels, got {}",
            model.audio_channels(),
            wav.channels()
        )));
    }
    if wav.sample_rate != model.sample_rate() {
        return Err(SepError::Config(format!(
            "model expects {} Hz, got {} Hz",
            model.sample_rate(),
            wav.sample_rate
        )));
    }

    let norm = Normalizer::from_waveform(wav);
    let mut data = wav.data.clone();
    norm.forward(&mut data);

    let out = match apply_inner(model, data.view(), config, progress) {
        Ok(out) => out,
        Err(SepError::Cancelled) => return Ok(SeparationOutcome::Cancelled),
        Err(e) => return Err(e),
    };

    let mut stems = BTreeMap::new();
    for (idx, name) in model.sources().iter().enumerate() {
        let mut stem = out.slice(s![idx, .., ..]).to_owned();
        norm.inverse(&mut stem);
        stems.insert(name.clone(), Waveform::new(stem, wav.sample_rate));
    }

    // The caller gets back a reference that went through the same
    // forward/inverse conditioning as the stems.
    norm.inverse(&mut data);
    Ok(SeparationOutcome::Separated {
        original: Waveform::new(data, wav.sample_rate),
        stems,
    })
}

fn apply_inner(
    model: &ModelSpec,
    mix: ArrayView2<'_, f32>,
    config: &ApplyConfig,
    progress: Option<&ProgressHandler>,
) -> SepResult<Array3<f32>> {
    config.validate()?;
    let audio_length = mix.dim().1;
    let guard = DeviceGuard::new(config.device, config.jobs);

    match model {
        ModelSpec::Single(single) => {
            let emitter = Emitter {
                handler: progress,
                model_idx_in_bag: 0,
                models: 1,
                audio_length,
            };
            apply_single(single.as_ref(), mix, config, &guard, &emitter)
        }
        ModelSpec::Bag(bag) => apply_bag(bag, mix, config, &guard, progress, audio_length),
    }
}

/// Run every ensemble member independently and combine per source with the
/// member weights, normalized by the total weight contributing to the source.
fn apply_bag(
    bag: &BagOfModels,
    mix: ArrayView2<'_, f32>,
    config: &ApplyConfig,
    guard: &DeviceGuard,
    progress: Option<&ProgressHandler>,
    audio_length: usize,
) -> SepResult<Array3<f32>> {
    let (channels, length) = mix.dim();
    let union = bag.sources();
    let mut sum = Array3::<f32>::zeros((union.len(), channels, length));
    let mut totals = vec![0.0f32; union.len()];

    for (k, member) in bag.models().iter().enumerate() {
        let emitter = Emitter {
            handler: progress,
            model_idx_in_bag: k,
            models: bag.len(),
            audio_length,
        };
        emitter.checkpoint(0, 0, ProgressState::Start)?;
        let out = apply_single(member.as_ref(), mix, config, guard, &emitter)?;
        emitter.checkpoint(0, 0, ProgressState::End)?;

        for (local, name) in member.sources().iter().enumerate() {
            let u = union.iter().position(|s| s == name).ok_or_else(|| {
                SepError::Internal(format!("source '{name}' missing from bag union"))
            })?;
            let w = bag.weight(k, u);
            if w == 0.0 {
                continue;
            }
            let src = out.slice(s![local, .., ..]);
            sum.slice_mut(s![u, .., ..])
                .zip_mut_with(&src, |d, &v| *d += w * v);
            totals[u] += w;
        }
    }

    for (u, &total) in totals.iter().enumerate() {
        // positive totals are guaranteed by BagOfModels construction
        if total <= 0.0 {
            return Err(SepError::Internal(format!(
                "no weight accumulated for source '{}'",
                union[u]
            )));
        }
        if total != 1.0 {
            sum.slice_mut(s![u, .., ..]).mapv_inplace(|v| v / total);
        }
    }

    Ok(sum)
}

/// Run one model over the mix: whole-signal mode, or the segment executor
/// with weighted overlap-add reconstruction.
fn apply_single(
    model: &dyn Model,
    mix: ArrayView2<'_, f32>,
    config: &ApplyConfig,
    guard: &DeviceGuard,
    emitter: &Emitter<'_>,
) -> SepResult<Array3<f32>> {
    let (channels, length) = mix.dim();
    if channels != model.audio_channels() {
        return Err(SepError::Config(format!(
            "model expects {} channels, got {}",
            model.audio_channels(),
            channels
        )));
    }

    let max_len = model.max_segment_len();

    if !config.split {
        if length > max_len {
            return Err(SepError::Config(format!(
                "audio of {length} samples exceeds the model maximum of {max_len}; enable split"
            )));
        }
        // One whole-signal pass, padded up to the model maximum and trimmed
        // back; no taper so the identity case stays exact.
        if length < max_len {
            let mut padded = Array2::<f32>::zeros((channels, max_len));
            padded.slice_mut(s![.., ..length]).assign(&mix);
            let out = shift_average(model, guard, padded.view(), config.shifts, emitter, 0)?;
            return Ok(out.slice(s![.., .., ..length]).to_owned());
        }
        return shift_average(model, guard, mix, config.shifts, emitter, 0);
    }

    let segment_len = segment_samples(model, config)?;
    let plan = plan_segments(length, segment_len, config.overlap)?;
    log::debug!(
        "processing {} segments of {} samples (stride {}, jobs {})",
        plan.segments.len(),
        plan.segment_len,
        plan.stride,
        config.jobs
    );

    let process = |segment: &Segment| -> SepResult<Array3<f32>> {
        let chunk = extract_chunk(&mix, segment, length);
        let out = shift_average(
            model,
            guard,
            chunk.view(),
            config.shifts,
            emitter,
            segment.start,
        )?;
        if config.progress {
            log::info!(
                "segment at offset {} done ({}/{} samples)",
                segment.start,
                (segment.start + segment.length).min(length),
                length
            );
        }
        Ok(out)
    };

    let results: Vec<Array3<f32>> = if config.jobs == 0 {
        plan.segments.iter().map(process).collect::<SepResult<_>>()?
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs)
            .build()
            .map_err(|e| SepError::Internal(format!("failed to build worker pool: {e}")))?;
        pool.install(|| {
            plan.segments
                .par_iter()
                .map(process)
                .collect::<SepResult<_>>()
        })?
    };

    // Deferred single-threaded accumulation: every worker computed its full
    // contribution independently, so nothing is double-counted or lost.
    let mut ola = OverlapAdd::new(model.sources().len(), channels, length, plan.weight.clone());
    for (segment, out) in plan.segments.iter().zip(&results) {
        ola.add(segment, out);
    }
    ola.finish()
}

/// Resolve the configured segment length in samples, clamped to the model maximum.
fn segment_samples(model: &dyn Model, config: &ApplyConfig) -> SepResult<usize> {
    let max_len = model.max_segment_len();
    match config.segment {
        None => Ok(max_len),
        Some(seconds) => {
            let samples = (seconds * model.sample_rate() as f64) as usize;
            if samples == 0 {
                return Err(SepError::Config(format!(
                    "segment of {seconds} s rounds to zero samples"
                )));
            }
            if samples > max_len {
                log::warn!(
                    "requested segment of {samples} samples exceeds the model maximum of {max_len}; clamping"
                );
                return Ok(max_len);
            }
            Ok(samples)
        }
    }
}

/// Copy one segment out of the mix, zero-filling past the audio end.
fn extract_chunk(
    mix: &ArrayView2<'_, f32>,
    segment: &Segment,
    audio_len: usize,
) -> Array2<f32> {
    let channels = mix.dim().0;
    let mut chunk = Array2::<f32>::zeros((channels, segment.length));
    let valid = segment.valid_len(audio_len);
    chunk
        .slice_mut(s![.., ..valid])
        .assign(&mix.slice(s![.., segment.start..segment.start + valid]));
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_chunk_pads_past_end() {
        let mix = Array2::from_shape_fn((1, 10), |(_, i)| i as f32);
        let view = mix.view();
        let chunk = extract_chunk(
            &view,
            &Segment {
                start: 6,
                length: 8,
            },
            10,
        );
        assert_eq!(chunk.dim(), (1, 8));
        assert_eq!(chunk[[0, 0]], 6.0);
        assert_eq!(chunk[[0, 3]], 9.0);
        assert_eq!(chunk[[0, 4]], 0.0);
        assert_eq!(chunk[[0, 7]], 0.0);
    }
}
