//! Windowing policy and weighted overlap-add reconstruction
//!
//! Long audio is split into overlapping fixed-length segments. Each segment
//! is processed independently, multiplied by a taper that is maximal at the
//! segment center, and accumulated into a full-length buffer alongside a
//! weight-sum buffer. The final output divides the two, which down-weights
//! boundary artifacts where segments overlap. Trailing padding past the true
//! audio end never enters the weight sum.

use ndarray::{s, Array3};

use crate::error::{SepError, SepResult};

/// One bounded chunk of the input, in samples. May extend past the audio end;
/// the overrun is zero-filled on extraction and clipped on reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Start offset in samples
    pub start: usize,
    /// Segment length in samples
    pub length: usize,
}

impl Segment {
    /// Samples of this segment that lie inside `[0, audio_len)`
    pub fn valid_len(&self, audio_len: usize) -> usize {
        self.length.min(audio_len.saturating_sub(self.start))
    }

    /// Zero-filled samples past the audio end
    pub fn padding(&self, audio_len: usize) -> usize {
        self.length - self.valid_len(audio_len)
    }
}

/// Ordered segment cover of `[0, audio_len)` plus the shared weight curve.
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    /// Segments in offset order
    pub segments: Vec<Segment>,
    /// Segment length in samples
    pub segment_len: usize,
    /// Distance between consecutive segment starts
    pub stride: usize,
    /// Per-position reconstruction weight, one entry per segment position
    pub weight: Vec<f32>,
}

/// Compute the segment cover for the given audio length.
///
/// Stride is `segment_len * (1 - overlap)` and must round to at least one
/// sample; `overlap >= 1` is an input error. Every position in
/// `[0, audio_len)` is covered by at least one segment.
pub fn plan_segments(audio_len: usize, segment_len: usize, overlap: f32) -> SepResult<SegmentPlan> {
    if audio_len == 0 {
        return Err(SepError::Config("audio length must be positive".into()));
    }
    if segment_len == 0 {
        return Err(SepError::Config("segment length must be positive".into()));
    }
    if !(0.0..1.0).contains(&overlap) {
        return Err(SepError::Config(format!(
            "overlap must be in [0, 1), got {overlap}"
        )));
    }

    let stride = ((1.0 - overlap) * segment_len as f32) as usize;
    if stride == 0 {
        return Err(SepError::Config(format!(
            "segment of {segment_len} samples with overlap {overlap} yields a zero stride"
        )));
    }

    let mut segments = Vec::new();
    let mut start = 0;
    while start < audio_len {
        segments.push(Segment {
            start,
            length: segment_len,
        });
        start += stride;
    }

    Ok(SegmentPlan {
        segments,
        segment_len,
        stride,
        weight: weight_curve(segment_len),
    })
}

/// Triangular reconstruction taper: maximal at the segment center, decaying
/// toward the edges, strictly positive everywhere.
pub fn weight_curve(segment_len: usize) -> Vec<f32> {
    let peak = segment_len.div_ceil(2) as f32;
    (0..segment_len)
        .map(|i| (i + 1).min(segment_len - i) as f32 / peak)
        .collect()
}

/// Weighted overlap-add accumulator.
///
/// Holds a full-length `[sources, channels, samples]` weighted sum plus a
/// per-position weight total. Accumulation is single-threaded; parallel
/// segment execution collects results first and merges here afterwards.
pub struct OverlapAdd {
    sum: Array3<f32>,
    weight_total: Vec<f32>,
    curve: Vec<f32>,
    audio_len: usize,
}

impl OverlapAdd {
    /// Create zeroed accumulators for the given output shape
    pub fn new(sources: usize, channels: usize, audio_len: usize, curve: Vec<f32>) -> Self {
        Self {
            sum: Array3::zeros((sources, channels, audio_len)),
            weight_total: vec![0.0; audio_len],
            curve,
            audio_len,
        }
    }

    /// Accumulate one segment result, clipped to `[0, audio_len)`.
    ///
    /// `result` must be `[sources, channels, segment.length]`.
    pub fn add(&mut self, segment: &Segment, result: &Array3<f32>) {
        let valid = segment.valid_len(self.audio_len);
        for i in 0..valid {
            self.weight_total[segment.start + i] += self.curve[i];
        }

        let mut dst = self
            .sum
            .slice_mut(s![.., .., segment.start..segment.start + valid]);
        for ((source, channel, i), &value) in result.slice(s![.., .., ..valid]).indexed_iter() {
            dst[[source, channel, i]] += value * self.curve[i];
        }
    }

    /// Accumulated per-position weight (for coverage checks)
    pub fn weight_total(&self) -> &[f32] {
        &self.weight_total
    }

    /// Divide the weighted sum by the weight total.
    ///
    /// A non-positive weight anywhere inside the covered range is a windowing
    /// bug, reported as an internal consistency error.
    pub fn finish(self) -> SepResult<Array3<f32>> {
        for (i, &w) in self.weight_total.iter().enumerate() {
            if w <= 0.0 {
                return Err(SepError::Internal(format!(
                    "reconstruction weight is {w} at sample {i}"
                )));
            }
        }
        let mut out = self.sum;
        let weight = self.weight_total;
        for ((_, _, i), value) in out.indexed_iter_mut() {
            *value /= weight[i];
        }
        Ok(out)
    }
}
