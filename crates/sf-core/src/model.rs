//! Model capability trait and the single/bag variants
//!
//! The neural network itself is opaque to this crate: anything implementing
//! [`Model`] can be driven through the windowed inference pipeline. Ensembles
//! are expressed as an explicit [`BagOfModels`] variant rather than run-time
//! type inspection.

use std::sync::Arc;

use ndarray::{Array3, ArrayView2};

use crate::error::{SepError, SepResult};

/// Opaque forward transform with a fixed receptive-length contract.
pub trait Model: Send + Sync {
    /// Ordered names of the sources this model produces
    fn sources(&self) -> &[String];

    /// Sample rate the model expects
    fn sample_rate(&self) -> u32;

    /// Number of audio channels the model expects
    fn audio_channels(&self) -> usize;

    /// Longest chunk (in samples) a single forward pass accepts
    fn max_segment_len(&self) -> usize;

    /// Forward transform: `[channels, samples]` -> `[sources, channels, samples]`.
    ///
    /// The output must have the same sample count as the input.
    fn forward(&self, mix: ArrayView2<'_, f32>) -> SepResult<Array3<f32>>;
}

/// Weighted ensemble of independently trained models combined at inference time.
///
/// Sources are the union of member sources, ordered by first appearance.
/// Each member carries a non-negative weight per source it produces; the
/// combined output for a source is the weighted average over the members that
/// produce it.
pub struct BagOfModels {
    models: Vec<Arc<dyn Model>>,
    sources: Vec<String>,
    /// `weights[member][union source index]`, zero where the member lacks the source
    weights: Vec<Vec<f32>>,
    sample_rate: u32,
    audio_channels: usize,
}

impl BagOfModels {
    /// Build a bag from members and optional per-member weight vectors.
    ///
    /// `weights[k]` is aligned to `models[k].sources()`; `None` gives every
    /// member weight 1.0 for each of its own sources. Fails if members
    /// disagree on sample rate or channel count, if a weight is negative, or
    /// if the total weight for any source in the union is not positive.
    pub fn new(
        models: Vec<Arc<dyn Model>>,
        weights: Option<Vec<Vec<f32>>>,
    ) -> SepResult<Self> {
        if models.is_empty() {
            return Err(SepError::Config(
                "bag of models requires at least one member".into(),
            ));
        }

        let sample_rate = models[0].sample_rate();
        let audio_channels = models[0].audio_channels();
        for model in &models {
            if model.sample_rate() != sample_rate {
                return Err(SepError::Config(format!(
                    "bag members disagree on sample rate: {} vs {}",
                    sample_rate,
                    model.sample_rate()
                )));
            }
            if model.audio_channels() != audio_channels {
                return Err(SepError::Config(format!(
                    "bag members disagree on channel count: {} vs {}",
                    audio_channels,
                    model.audio_channels()
                )));
            }
        }

        // Union of member sources, ordered by first appearance
        let mut sources: Vec<String> = Vec::new();
        for model in &models {
            for name in model.sources() {
                if !sources.contains(name) {
                    sources.push(name.clone());
                }
            }
        }

        let member_weights = match weights {
            Some(given) => {
                if given.len() != models.len() {
                    return Err(SepError::Config(format!(
                        "expected {} weight vectors, got {}",
                        models.len(),
                        given.len()
                    )));
                }
                for (model, vector) in models.iter().zip(&given) {
                    if vector.len() != model.sources().len() {
                        return Err(SepError::Config(format!(
                            "weight vector of length {} does not match {} model sources",
                            vector.len(),
                            model.sources().len()
                        )));
                    }
                    if vector.iter().any(|&w| w < 0.0 || !w.is_finite()) {
                        return Err(SepError::Config(
                            "source weights must be finite and non-negative".into(),
                        ));
                    }
                }
                given
            }
            None => models
                .iter()
                .map(|m| vec![1.0; m.sources().len()])
                .collect(),
        };

        // Expand per-member weights over the union
        let mut matrix = vec![vec![0.0f32; sources.len()]; models.len()];
        for (k, model) in models.iter().enumerate() {
            for (i, name) in model.sources().iter().enumerate() {
                let u = sources
                    .iter()
                    .position(|s| s == name)
                    .ok_or_else(|| {
                        SepError::Internal(format!("source '{name}' missing from bag union"))
                    })?;
                matrix[k][u] = member_weights[k][i];
            }
        }

        for (u, name) in sources.iter().enumerate() {
            let total: f32 = matrix.iter().map(|row| row[u]).sum();
            if total <= 0.0 {
                return Err(SepError::Config(format!(
                    "total weight for source '{name}' must be positive, got {total}"
                )));
            }
        }

        Ok(Self {
            models,
            sources,
            weights: matrix,
            sample_rate,
            audio_channels,
        })
    }

    /// Ensemble members, in combination order
    pub fn models(&self) -> &[Arc<dyn Model>] {
        &self.models
    }

    /// Union of member sources
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True if the bag has no members (never true for a constructed bag)
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Weight of `member` for the union source at `source_idx`
    pub fn weight(&self, member: usize, source_idx: usize) -> f32 {
        self.weights[member][source_idx]
    }

    /// Sample rate shared by all members
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count shared by all members
    pub fn audio_channels(&self) -> usize {
        self.audio_channels
    }
}

/// Tagged model variant with a uniform capability surface.
pub enum ModelSpec {
    /// One forward transform
    Single(Arc<dyn Model>),
    /// Weighted ensemble
    Bag(BagOfModels),
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSpec::Single(_) => f.write_str("ModelSpec::Single"),
            ModelSpec::Bag(bag) => f.debug_tuple("ModelSpec::Bag").field(&bag.len()).finish(),
        }
    }
}

impl ModelSpec {
    /// Ordered source names of the separation output
    pub fn sources(&self) -> &[String] {
        match self {
            ModelSpec::Single(model) => model.sources(),
            ModelSpec::Bag(bag) => bag.sources(),
        }
    }

    /// Expected input sample rate
    pub fn sample_rate(&self) -> u32 {
        match self {
            ModelSpec::Single(model) => model.sample_rate(),
            ModelSpec::Bag(bag) => bag.sample_rate(),
        }
    }

    /// Expected input channel count
    pub fn audio_channels(&self) -> usize {
        match self {
            ModelSpec::Single(model) => model.audio_channels(),
            ModelSpec::Bag(bag) => bag.audio_channels(),
        }
    }

    /// Count of submodels (1 for a single model)
    pub fn models(&self) -> usize {
        match self {
            ModelSpec::Single(_) => 1,
            ModelSpec::Bag(bag) => bag.len(),
        }
    }
}
