//! # StemForge Separator
//!
//! The caller-facing wrapper over the separation pipeline: pick a model from
//! a repository (or hand one in), tune parameters between calls, then feed it
//! waveforms or files and get named stems back.
//!
//! ```rust,ignore
//! use sf_models::LocalRepo;
//! use sf_sep::Separator;
//!
//! let repo = LocalRepo::open("models")?;
//! let mut separator = Separator::new("four_stem", &repo)?;
//! separator.update(ConfigPatch::new().shifts(2).overlap(0.5));
//! let outcome = separator.separate_file_to(
//!     "song.mp3".as_ref(),
//!     "stems/".as_ref(),
//!     &WavOutput::default(),
//! )?;
//! ```

use std::path::Path;

use thiserror::Error;

use sf_audio::{AudioError, WavOutput};
use sf_core::{
    ApplyConfig, ConfigPatch, ModelSpec, ProgressHandler, SepError, SeparationOutcome, Waveform,
};
use sf_models::{LocalRepo, ModelError};

/// Failures at the separator boundary, split by the subsystem that failed
#[derive(Error, Debug)]
pub enum SeparatorError {
    #[error("separation failed: {0}")]
    Core(#[from] SepError),

    #[error("audio I/O failed: {0}")]
    Audio(#[from] AudioError),

    #[error("model loading failed: {0}")]
    Model(#[from] ModelError),
}

/// Result type for separator operations
pub type SeparatorResult<T> = Result<T, SeparatorError>;

/// A loaded model plus the mutable parameters applied to every call.
///
/// Parameter updates between calls take effect on the next call; each call
/// runs against an immutable snapshot of the configuration.
pub struct Separator {
    model: ModelSpec,
    name: String,
    config: ApplyConfig,
    progress: Option<ProgressHandler>,
}

impl Separator {
    /// Load a model (or bag) by name from a repository
    pub fn new(name: &str, repo: &LocalRepo) -> SeparatorResult<Self> {
        let model = repo.load(name)?;
        Ok(Self {
            model,
            name: name.to_string(),
            config: ApplyConfig::default(),
            progress: None,
        })
    }

    /// Wrap an already-loaded model
    pub fn from_model(model: ModelSpec) -> Self {
        Self {
            model,
            name: "custom".to_string(),
            config: ApplyConfig::default(),
            progress: None,
        }
    }

    /// Name the model was loaded under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source names this separator produces
    pub fn sources(&self) -> &[String] {
        self.model.sources()
    }

    /// Current parameter snapshot
    pub fn config(&self) -> &ApplyConfig {
        &self.config
    }

    /// Apply a partial parameter update; unset fields keep their prior
    /// values. Accelerator devices the inference backend cannot serve are
    /// replaced with the CPU.
    pub fn update(&mut self, patch: ConfigPatch) {
        let mut config = patch.apply_to(&self.config);
        config.device = sf_models::effective_device(config.device);
        self.config = config;
    }

    /// Install (or clear) the progress/cancellation handler
    pub fn set_progress(&mut self, progress: Option<ProgressHandler>) {
        self.progress = progress;
    }

    /// Separate an in-memory waveform into named stems.
    ///
    /// The input is converted to the model's channel layout and sample rate
    /// first; stems come back at the model's sample rate.
    pub fn separate(&self, wav: &Waveform) -> SeparatorResult<SeparationOutcome> {
        let conformed;
        let input = if wav.sample_rate != self.model.sample_rate()
            || wav.channels() != self.model.audio_channels()
        {
            conformed = sf_audio::conform(
                wav,
                self.model.sample_rate(),
                self.model.audio_channels(),
            )?;
            &conformed
        } else {
            wav
        };

        let outcome = sf_core::separate(&self.model, input, &self.config, self.progress.as_ref())?;
        Ok(outcome)
    }

    /// Decode a file and separate it
    pub fn separate_file(&self, path: &Path) -> SeparatorResult<SeparationOutcome> {
        log::info!("separating {} with model '{}'", path.display(), self.name);
        let wav = sf_audio::load_audio(path)?;
        self.separate(&wav)
    }

    /// Decode a file, separate it, and write one WAV per stem into `out_dir`.
    ///
    /// On cancellation nothing is written and the outcome reports it; a
    /// partial stem set never reaches the disk.
    pub fn separate_file_to(
        &self,
        path: &Path,
        out_dir: &Path,
        output: &WavOutput,
    ) -> SeparatorResult<SeparationOutcome> {
        let outcome = self.separate_file(path)?;

        let SeparationOutcome::Separated { stems, .. } = &outcome else {
            log::info!("separation of {} cancelled, nothing written", path.display());
            return Ok(outcome);
        };

        std::fs::create_dir_all(out_dir).map_err(AudioError::Io)?;
        for (name, stem) in stems {
            let stem_path = out_dir.join(format!("{name}.wav"));
            sf_audio::save_waveform(stem, &stem_path, output)?;
            log::info!("wrote {}", stem_path.display());
        }

        Ok(outcome)
    }
}
