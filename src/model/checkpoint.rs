//! Checkpoint format and loading.
//!
//! A checkpoint is a single MessagePack file written by Burn's named file
//! recorder at full precision. It bundles:
//! - `class_names`: ordered class labels the weights were trained against
//! - `architecture`: JSON of the `LeafClassifierConfig` used to build the model
//! - `model_state_dict`: the classifier record (all weights and BN statistics)
//!
//! The head's output width must equal the number of class names.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder, RecorderError},
    tensor::{backend::Backend, Tensor},
};
use tracing::{debug, info};

use super::classifier::{LeafClassifier, LeafClassifierConfig, LeafClassifierRecord};
use crate::utils::error::{LeafbotError, Result};

/// Recorder used for checkpoint files
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// File extension the recorder enforces on checkpoint paths
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Side of the zero image used to verify a freshly bound model
const VERIFY_INPUT_SIZE: usize = 32;

/// Persisted checkpoint: class names plus weights
#[derive(Record)]
pub struct ModelCheckpoint<B: Backend> {
    pub class_names: Vec<String>,
    pub architecture: String,
    pub model_state_dict: LeafClassifierRecord<B>,
}

impl<B: Backend> ModelCheckpoint<B> {
    /// Bundle a model with its configuration and class names
    pub fn new(
        config: &LeafClassifierConfig,
        class_names: Vec<String>,
        model: LeafClassifier<B>,
    ) -> Result<Self> {
        let architecture = serde_json::to_string(config)
            .map_err(|e| LeafbotError::Config(format!("cannot serialize architecture: {}", e)))?;

        Ok(Self {
            class_names,
            architecture,
            model_state_dict: model.into_record(),
        })
    }

    /// Write the checkpoint; the path's extension is replaced with `.mpk`
    pub fn save(self, path: &Path) -> Result<PathBuf> {
        let path = checkpoint_file(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LeafbotError::model_load(&path, e))?;
        }

        let recorder = CheckpointRecorder::new();
        <CheckpointRecorder as Recorder<B>>::record(&recorder, self, path.clone())
            .map_err(|e| LeafbotError::model_load(&path, format!("{:?}", e)))?;

        info!("Checkpoint saved to {:?}", path);
        Ok(path)
    }

    /// Parse the stored architecture
    pub fn config(&self) -> std::result::Result<LeafClassifierConfig, String> {
        serde_json::from_str(&self.architecture)
            .map_err(|e| format!("invalid architecture description: {}", e))
    }

    /// Validate the checkpoint and bind its weights to a freshly built model.
    ///
    /// Fails with a model load error when the class list is empty, the
    /// architecture is unreadable or disagrees with the class count, or the
    /// stored weights do not fit the architecture.
    pub fn bind(
        self,
        path: &Path,
        device: &B::Device,
    ) -> Result<(LeafClassifier<B>, Vec<String>)> {
        let fail = |reason: String| LeafbotError::model_load(path, reason);

        if self.class_names.is_empty() {
            return Err(fail("checkpoint declares no class names".to_string()));
        }

        let config = self.config().map_err(fail)?;
        config.validate().map_err(fail)?;

        if config.num_classes != self.class_names.len() {
            return Err(fail(format!(
                "architecture declares {} classes but checkpoint lists {} class names",
                config.num_classes,
                self.class_names.len()
            )));
        }

        let record = self.model_state_dict;
        let model = catch_unwind(AssertUnwindSafe(|| {
            config.init::<B>(device).load_record(record)
        }))
        .map_err(|_| fail("weights do not match the declared architecture".to_string()))?;

        if model.num_classes() != self.class_names.len() {
            return Err(fail(format!(
                "classification head outputs {} classes but checkpoint lists {} class names",
                model.num_classes(),
                self.class_names.len()
            )));
        }

        verify_forward(&model, &config, device).map_err(fail)?;

        debug!(
            "Bound {} classes to {}-channel backbone",
            self.class_names.len(),
            model.backbone.out_channels()
        );

        Ok((model, self.class_names))
    }
}

/// Run a zero image through the bound model and check the logit width
fn verify_forward<B: Backend>(
    model: &LeafClassifier<B>,
    config: &LeafClassifierConfig,
    device: &B::Device,
) -> std::result::Result<(), String> {
    let input = Tensor::<B, 4>::zeros(
        [1, config.backbone.in_channels, VERIFY_INPUT_SIZE, VERIFY_INPUT_SIZE],
        device,
    );

    let dims = catch_unwind(AssertUnwindSafe(|| model.forward(input).dims()))
        .map_err(|_| "forward pass failed with the stored weights".to_string())?;

    if dims != [1, config.num_classes] {
        return Err(format!(
            "forward pass produced shape {:?}, expected [1, {}]",
            dims, config.num_classes
        ));
    }

    Ok(())
}

/// Path as the recorder will open it
pub fn checkpoint_file(path: &Path) -> PathBuf {
    path.with_extension(CHECKPOINT_EXTENSION)
}

fn load_error(file: &Path, err: RecorderError) -> LeafbotError {
    match err {
        RecorderError::FileNotFound(_) => LeafbotError::model_load(file, "checkpoint file not found"),
        other => LeafbotError::model_load(file, format!("unreadable checkpoint: {:?}", other)),
    }
}

/// Where checkpoints come from. The model cache reads through this seam.
pub trait CheckpointSource<B: Backend>: Send + Sync {
    fn read(&self, path: &Path, device: &B::Device) -> Result<ModelCheckpoint<B>>;
}

/// Reads checkpoints from `.mpk` files on disk
#[derive(Debug, Default, Clone, Copy)]
pub struct MpkCheckpointSource;

impl<B: Backend> CheckpointSource<B> for MpkCheckpointSource {
    fn read(&self, path: &Path, device: &B::Device) -> Result<ModelCheckpoint<B>> {
        let file = checkpoint_file(path);

        let recorder = CheckpointRecorder::new();
        let checkpoint: ModelCheckpoint<B> =
            <CheckpointRecorder as Recorder<B>>::load(&recorder, file.clone(), device)
                .map_err(|e| load_error(&file, e))?;

        info!("Checkpoint loaded from {:?}", file);
        Ok(checkpoint)
    }
}
