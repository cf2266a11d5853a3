//! # StemForge Separation Core
//!
//! Inference orchestration for multi-source audio separation. The neural
//! network is an opaque transform behind the [`Model`] trait; this crate owns
//! everything around it:
//! - Windowing policy: overlapping segment cover + reconstruction taper
//! - Shift averager: randomized time shifts per segment, averaged
//! - Segment executor: sequential or rayon worker-pool dispatch
//! - Overlap-add reconstructor: weighted accumulation, weight-sum division
//! - Ensemble combiner: weighted bag-of-models averaging per source
//! - Normalization wrapper: zero-mean/unit-variance conditioning
//! - Progress/cancellation channel: synchronous callbacks, cooperative abort
//!
//! ## Pipeline
//!
//! ```text
//! Waveform ─ normalize ─► per member ─► segments ─► shifts ─► forward
//!                              ▲            │          │         │
//!                              │            ▼          ▼         ▼
//! stems ◄─ denormalize ◄─ combine ◄─ overlap-add ◄─ average ◄─ output
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sf_core::{separate, ApplyConfig, ModelSpec, SeparationOutcome, Waveform};
//!
//! let config = ApplyConfig::default();
//! match separate(&model, &waveform, &config, None)? {
//!     SeparationOutcome::Separated { stems, .. } => {
//!         let vocals = &stems["vocals"];
//!     }
//!     SeparationOutcome::Cancelled => {}
//! }
//! ```

mod apply;
mod config;
mod error;
mod model;
mod normalize;
mod progress;
mod shifts;
mod waveform;
mod window;

pub use apply::{apply_model, separate, ApplyOutcome, SeparationOutcome};
pub use config::{ApplyConfig, ConfigPatch, Device, DeviceGuard};
pub use error::{SepError, SepResult};
pub use model::{BagOfModels, Model, ModelSpec};
pub use normalize::{Normalizer, NORM_EPSILON};
pub use progress::{
    ProgressCallback, ProgressControl, ProgressEvent, ProgressHandler, ProgressState,
};
pub use shifts::MAX_SHIFT_SECONDS;
pub use waveform::Waveform;
pub use window::{plan_segments, weight_curve, OverlapAdd, Segment, SegmentPlan};
