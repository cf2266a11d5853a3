//! ONNX inference sessions
//!
//! Tract (pure Rust) runs the separation network on CPU. The session takes
//! `[1, channels, samples]` and must return `[1, sources, channels, samples]`;
//! anything else is rejected before it can corrupt the reconstruction.

use std::path::Path;

use ndarray::{Array3, ArrayView2};
use tract_onnx::prelude::*;

use sf_core::{Device, Model, SepError, SepResult};

use crate::error::{ModelError, ModelResult};

type RunnableOnnx = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A loaded, optimized, runnable ONNX plan
pub struct OnnxSession {
    plan: RunnableOnnx,
}

impl OnnxSession {
    /// Load and optimize an ONNX file
    pub fn load(path: &Path) -> ModelResult<Self> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.display().to_string()));
        }

        let name = path.display().to_string();
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| ModelError::LoadFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?
            .into_optimized()
            .map_err(|e| ModelError::LoadFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?
            .into_runnable()
            .map_err(|e| ModelError::LoadFailed {
                name,
                reason: e.to_string(),
            })?;

        Ok(Self { plan })
    }

    /// Run one forward pass: `[1, channels, samples]` in,
    /// `[1, sources, channels, samples]` out.
    pub fn run(&self, input: ndarray::Array3<f32>) -> ModelResult<ndarray::Array4<f32>> {
        let tensor: Tensor = input.into();
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let output = outputs
            .first()
            .ok_or_else(|| ModelError::Inference("model produced no output".to_string()))?;

        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        view.to_owned()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| ModelError::Inference(format!("expected 4D output: {e}")))
    }
}

/// Static capabilities of a separation model
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelMeta {
    /// Source names in the model's output order
    pub sources: Vec<String>,
    /// Sample rate the network was trained at
    pub sample_rate: u32,
    /// Channel count the network expects
    pub audio_channels: usize,
    /// Longest chunk the network accepts, in seconds
    pub segment: f64,
}

impl ModelMeta {
    pub(crate) fn validate(&self, name: &str) -> ModelResult<()> {
        if self.sources.is_empty() {
            return Err(ModelError::InvalidMetadata {
                name: name.to_string(),
                reason: "empty source list".to_string(),
            });
        }
        if self.sample_rate == 0 || self.audio_channels == 0 {
            return Err(ModelError::InvalidMetadata {
                name: name.to_string(),
                reason: "sample rate and channel count must be positive".to_string(),
            });
        }
        if !(self.segment > 0.0) {
            return Err(ModelError::InvalidMetadata {
                name: name.to_string(),
                reason: format!("segment of {} seconds is not positive", self.segment),
            });
        }
        Ok(())
    }

    /// Maximum chunk length in samples
    pub fn max_segment_len(&self) -> usize {
        (self.segment * self.sample_rate as f64) as usize
    }
}

/// A separation model backed by an ONNX session
pub struct OnnxSeparationModel {
    session: OnnxSession,
    meta: ModelMeta,
}

impl OnnxSeparationModel {
    /// Load model weights and pair them with their metadata
    pub fn load(path: &Path, meta: ModelMeta) -> ModelResult<Self> {
        meta.validate(&path.display().to_string())?;
        let session = OnnxSession::load(path)?;
        log::info!(
            "loaded model {} ({} sources, {} Hz, {} channels)",
            path.display(),
            meta.sources.len(),
            meta.sample_rate,
            meta.audio_channels
        );
        Ok(Self { session, meta })
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }
}

impl Model for OnnxSeparationModel {
    fn sources(&self) -> &[String] {
        &self.meta.sources
    }

    fn sample_rate(&self) -> u32 {
        self.meta.sample_rate
    }

    fn audio_channels(&self) -> usize {
        self.meta.audio_channels
    }

    fn max_segment_len(&self) -> usize {
        self.meta.max_segment_len()
    }

    fn forward(&self, mix: ArrayView2<'_, f32>) -> SepResult<Array3<f32>> {
        let (channels, samples) = mix.dim();
        let input = mix
            .to_owned()
            .insert_axis(ndarray::Axis(0));

        let output = self
            .session
            .run(input)
            .map_err(|e| SepError::Model(e.to_string()))?;

        let expected = (1, self.meta.sources.len(), channels, samples);
        if output.dim() != expected {
            return Err(SepError::InvalidOutputShape {
                expected: format!("{expected:?}"),
                got: format!("{:?}", output.dim()),
            });
        }

        Ok(output.index_axis_move(ndarray::Axis(0), 0))
    }
}

/// Resolve the device actually usable by the tract backend.
///
/// Tract runs on CPU only; an accelerator request is honored as far as the
/// serialization guard in the core is concerned, but execution falls back.
pub fn effective_device(requested: Device) -> Device {
    if requested.is_accelerator() {
        log::warn!("{requested:?} requested but the inference backend is CPU-only, falling back");
        return Device::Cpu;
    }
    requested
}
