//! Separator behavior against a mock model

use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::{s, Array2, Array3, ArrayView2};

use sf_audio::{ClipPolicy, WavOutput};
use sf_core::{
    ConfigPatch, Device, Model, ModelSpec, ProgressControl, ProgressHandler, SepResult,
    SeparationOutcome, Waveform,
};
use sf_sep::Separator;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Identity model: every stem is a copy of the mix.
struct Passthrough {
    sources: Vec<String>,
}

impl Passthrough {
    fn spec(sources: &[&str]) -> ModelSpec {
        ModelSpec::Single(Arc::new(Self {
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }))
    }
}

impl Model for Passthrough {
    fn sources(&self) -> &[String] {
        &self.sources
    }
    fn sample_rate(&self) -> u32 {
        44_100
    }
    fn audio_channels(&self) -> usize {
        2
    }
    fn max_segment_len(&self) -> usize {
        44_100 * 10
    }
    fn forward(&self, mix: ArrayView2<'_, f32>) -> SepResult<Array3<f32>> {
        let (ch, len) = mix.dim();
        let mut out = Array3::zeros((self.sources.len(), ch, len));
        for idx in 0..self.sources.len() {
            out.slice_mut(s![idx, .., ..]).assign(&mix);
        }
        Ok(out)
    }
}

fn test_waveform(channels: usize, len: usize, sample_rate: u32) -> Waveform {
    let data = Array2::from_shape_fn((channels, len), |(ch, i)| {
        (0.001 * i as f32 + 0.2 * ch as f32).sin() * 0.5
    });
    Waveform::new(data, sample_rate)
}

#[test]
fn test_update_keeps_unset_fields() {
    let mut separator = Separator::from_model(Passthrough::spec(&["vocals", "other"]));
    let overlap_before = separator.config().overlap;

    separator.update(ConfigPatch::new().shifts(3));
    assert_eq!(separator.config().shifts, 3);
    assert_eq!(separator.config().overlap, overlap_before);

    separator.update(ConfigPatch::new().overlap(0.5));
    assert_eq!(separator.config().shifts, 3);
    assert_eq!(separator.config().overlap, 0.5);
}

#[test]
fn test_accelerator_request_falls_back_to_cpu() {
    let mut separator = Separator::from_model(Passthrough::spec(&["vocals"]));
    separator.update(ConfigPatch::new().device(Device::Cuda { device_id: 0 }));
    assert_eq!(separator.config().device, Device::Cpu);
}

#[test]
fn test_separate_conforms_input_layout() {
    init_logging();
    let mut separator = Separator::from_model(Passthrough::spec(&["vocals", "other"]));
    separator.update(ConfigPatch::new().shifts(0));

    // mono at 22.05 kHz against a stereo 44.1 kHz model
    let wav = test_waveform(1, 22_050, 22_050);
    let outcome = separator.separate(&wav).unwrap();

    let SeparationOutcome::Separated { stems, .. } = outcome else {
        panic!("expected a completed separation");
    };
    let vocals = &stems["vocals"];
    assert_eq!(vocals.channels(), 2);
    assert_eq!(vocals.sample_rate, 44_100);
    assert_eq!(vocals.len(), 44_100);
}

#[test]
fn test_file_round_trip_writes_all_stems() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mix.wav");
    let out_dir = dir.path().join("stems");

    let wav = test_waveform(2, 44_100, 44_100);
    let float_out = WavOutput {
        bits_per_sample: 32,
        float: true,
        clip: ClipPolicy::None,
    };
    sf_audio::save_waveform(&wav, &input, &float_out).unwrap();

    let mut separator = Separator::from_model(Passthrough::spec(&["drums", "bass"]));
    separator.update(ConfigPatch::new().shifts(0));

    let outcome = separator
        .separate_file_to(&input, &out_dir, &float_out)
        .unwrap();
    assert!(!matches!(outcome, SeparationOutcome::Cancelled));

    for name in ["drums", "bass"] {
        let stem = sf_audio::load_audio(&out_dir.join(format!("{name}.wav"))).unwrap();
        assert_eq!(stem.channels(), 2);
        assert_eq!(stem.len(), 44_100);
        // identity model: each stem reproduces the mix
        for (a, b) in stem.data.iter().zip(wav.data.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }
}

#[test]
fn test_cancellation_never_reaches_the_writer() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("mix.wav");
    let out_dir = dir.path().join("stems");

    let wav = test_waveform(2, 44_100, 44_100);
    sf_audio::save_waveform(&wav, &input, &WavOutput::default()).unwrap();

    let mut separator = Separator::from_model(Passthrough::spec(&["vocals"]));
    separator.set_progress(Some(ProgressHandler::new(|_, _| ProgressControl::Abort)));

    let outcome = separator
        .separate_file_to(&input, &out_dir, &WavOutput::default())
        .unwrap();

    assert!(outcome.is_cancelled());
    // no stem directory, no partial files
    assert!(!out_dir.exists());
}
