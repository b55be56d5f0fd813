//! Helpers shared by the unit tests: tiny models, checkpoints and images.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use burn::module::Param;
use burn::tensor::{backend::Backend, Tensor};
use image::{ImageFormat, Rgb, RgbImage};

use crate::model::backbone::{EfficientNetConfig, MbConvStageConfig};
use crate::model::checkpoint::{CheckpointSource, ModelCheckpoint, MpkCheckpointSource};
use crate::model::classifier::{LeafClassifier, LeafClassifierConfig};
use crate::utils::error::{LeafbotError, Result};

pub type TestBackend = burn_ndarray::NdArray;

/// Two-stage backbone small enough to run in a unit test
pub fn tiny_config(num_classes: usize) -> LeafClassifierConfig {
    let backbone = EfficientNetConfig::new(vec![
        MbConvStageConfig::new(1, 3, 1, 8, 1),
        MbConvStageConfig::new(4, 3, 2, 12, 1),
    ])
    .with_stem_channels(8)
    .with_head_channels(16);

    LeafClassifierConfig::new(num_classes, backbone)
        .with_fc1_units(32)
        .with_fc2_units(16)
}

pub fn class_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Save `model` as a checkpoint next to `path` and return the written file
pub fn write_checkpoint<B: Backend>(
    path: &Path,
    config: &LeafClassifierConfig,
    names: &[&str],
    model: LeafClassifier<B>,
) -> PathBuf {
    ModelCheckpoint::new(config, class_names(names), model)
        .unwrap()
        .save(path)
        .unwrap()
}

/// Classifier whose logits are `logits` for every input.
///
/// The output layer's weights are zeroed so only its bias reaches the logits.
pub fn fixed_logit_model<B: Backend>(
    config: &LeafClassifierConfig,
    logits: &[f32],
    device: &B::Device,
) -> LeafClassifier<B> {
    assert_eq!(logits.len(), config.num_classes);

    let mut model = config.init::<B>(device);
    model.head.output.weight =
        Param::from_tensor(Tensor::zeros([config.fc2_units, config.num_classes], device));
    model.head.output.bias = Some(Param::from_tensor(Tensor::from_floats(logits, device)));
    model
}

/// Logits whose softmax is exactly `probabilities`
pub fn logits_for(probabilities: &[f32]) -> Vec<f32> {
    probabilities.iter().map(|p| p.ln()).collect()
}

/// Solid-colour PNG encoded in memory
pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// Reads through `MpkCheckpointSource`, counting reads.
///
/// The first `fail_first` reads fail with a model load error. `delay` widens
/// the window in which concurrent callers can race on the first load.
pub struct CountingSource {
    pub reads: Arc<AtomicUsize>,
    pub fail_first: usize,
    pub delay: Duration,
}

impl CountingSource {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = Self {
            reads: Arc::clone(&reads),
            fail_first: 0,
            delay: Duration::ZERO,
        };
        (source, reads)
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl<B: Backend> CheckpointSource<B> for CountingSource {
    fn read(&self, path: &Path, device: &B::Device) -> Result<ModelCheckpoint<B>> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if n < self.fail_first {
            return Err(LeafbotError::model_load(path, "storage temporarily unavailable"));
        }
        MpkCheckpointSource.read(path, device)
    }
}
