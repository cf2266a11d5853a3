//! Inference configuration

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{SepError, SepResult};

/// Execution device for model forward passes.
///
/// The device is advisory for CPU-only inference backends; the orchestration
/// layer still uses it to decide whether forward passes must be serialized
/// (a single accelerator is a serially-reusable resource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// CPU execution
    #[default]
    Cpu,
    /// NVIDIA CUDA device
    Cuda {
        /// CUDA device index
        device_id: u32,
    },
    /// Apple CoreML
    CoreMl,
    /// DirectML (Windows)
    DirectMl,
}

impl Device {
    /// True for any device other than the CPU
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Device::Cpu)
    }
}

/// Configuration for one `apply` invocation.
///
/// Read at call entry and frozen for the duration of the call; callers that
/// mutate a held config between calls only affect the next invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Segment length in seconds (None = model maximum)
    pub segment: Option<f64>,

    /// Overlap fraction between consecutive segments, in [0, 1)
    pub overlap: f32,

    /// Number of randomized time shifts averaged per segment (0 = single pass)
    pub shifts: usize,

    /// Split into overlapping segments; when false the whole signal must fit
    /// within the model's maximum segment length
    pub split: bool,

    /// Execution device
    pub device: Device,

    /// Worker pool size (0 = synchronous, single-threaded)
    pub jobs: usize,

    /// Log per-segment progress at info level
    pub progress: bool,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            segment: None,
            overlap: 0.25,
            shifts: 1,
            split: true,
            device: Device::Cpu,
            jobs: 0,
            progress: false,
        }
    }
}

impl ApplyConfig {
    /// Validate configuration invariants
    pub fn validate(&self) -> SepResult<()> {
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(SepError::Config(format!(
                "overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }
        if let Some(seconds) = self.segment {
            if !(seconds > 0.0) {
                return Err(SepError::Config(format!(
                    "segment length must be positive, got {seconds}"
                )));
            }
        }
        Ok(())
    }
}

/// Partial configuration update.
///
/// Every field distinguishes "not provided" (`None`, leave the previous value
/// untouched) from an explicit new value, so callers can patch a held
/// [`ApplyConfig`] incrementally between calls without hidden state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    /// New segment length; `Some(None)` clears it back to the model maximum
    pub segment: Option<Option<f64>>,
    /// New overlap fraction
    pub overlap: Option<f32>,
    /// New shift count
    pub shifts: Option<usize>,
    /// New split flag
    pub split: Option<bool>,
    /// New device
    pub device: Option<Device>,
    /// New worker count
    pub jobs: Option<usize>,
    /// New progress flag
    pub progress: Option<bool>,
}

impl ConfigPatch {
    /// Empty patch (changes nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the segment length in seconds (`None` = model maximum)
    pub fn segment(mut self, seconds: Option<f64>) -> Self {
        self.segment = Some(seconds);
        self
    }

    /// Set the overlap fraction
    pub fn overlap(mut self, overlap: f32) -> Self {
        self.overlap = Some(overlap);
        self
    }

    /// Set the shift count
    pub fn shifts(mut self, shifts: usize) -> Self {
        self.shifts = Some(shifts);
        self
    }

    /// Set the split flag
    pub fn split(mut self, split: bool) -> Self {
        self.split = Some(split);
        self
    }

    /// Set the execution device
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Set the worker count
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Set the progress flag
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Produce a new immutable snapshot with the patch applied over `base`
    pub fn apply_to(&self, base: &ApplyConfig) -> ApplyConfig {
        let mut config = base.clone();
        if let Some(segment) = self.segment {
            config.segment = segment;
        }
        if let Some(overlap) = self.overlap {
            config.overlap = overlap;
        }
        if let Some(shifts) = self.shifts {
            config.shifts = shifts;
        }
        if let Some(split) = self.split {
            config.split = split;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(progress) = self.progress {
            config.progress = progress;
        }
        config
    }
}

/// Serializes forward passes when multiple workers share one accelerator.
///
/// CPU execution fans out freely; a single accelerator with `jobs > 1` gets a
/// mutex around every forward call.
pub struct DeviceGuard {
    lock: Option<Mutex<()>>,
}

impl DeviceGuard {
    /// Build the guard for the given device and worker count
    pub fn new(device: Device, jobs: usize) -> Self {
        let lock = (device.is_accelerator() && jobs > 1).then(|| Mutex::new(()));
        Self { lock }
    }

    /// Run `f`, holding the device lock if one is required
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.lock {
            Some(mutex) => {
                let _held = mutex.lock();
                f()
            }
            None => f(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ApplyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_overlap_bounds() {
        let mut config = ApplyConfig::default();
        config.overlap = 1.0;
        assert!(config.validate().is_err());

        config.overlap = 0.99;
        assert!(config.validate().is_ok());

        config.overlap = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let base = ApplyConfig::default();
        let patched = ConfigPatch::new().shifts(4).overlap(0.5).apply_to(&base);

        assert_eq!(patched.shifts, 4);
        assert_eq!(patched.overlap, 0.5);
        // untouched fields keep the prior values
        assert_eq!(patched.split, base.split);
        assert_eq!(patched.jobs, base.jobs);
        assert_eq!(patched.segment, base.segment);
    }

    #[test]
    fn test_patch_can_clear_segment() {
        let mut base = ApplyConfig::default();
        base.segment = Some(7.8);

        let patched = ConfigPatch::new().segment(None).apply_to(&base);
        assert_eq!(patched.segment, None);
    }

    #[test]
    fn test_device_guard_runs_closure() {
        let guard = DeviceGuard::new(Device::Cuda { device_id: 0 }, 4);
        assert_eq!(guard.run(|| 41 + 1), 42);

        let free = DeviceGuard::new(Device::Cpu, 8);
        assert_eq!(free.run(|| "ok"), "ok");
    }
}
