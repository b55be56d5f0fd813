//! Process-wide model cache
//!
//! Holds at most one loaded classifier. The first `get_or_load` reads the
//! checkpoint, binds the weights and stores the result; later calls hand out
//! the same `Arc` without touching storage. Concurrent first callers block
//! on the initialize-once cell, so exactly one load ever succeeds. A failed
//! load stores nothing and the next call tries again.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use burn::tensor::backend::Backend;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use super::preprocess::ImageTensor;
use crate::model::checkpoint::{checkpoint_file, CheckpointSource, MpkCheckpointSource};
use crate::model::classifier::LeafClassifier;
use crate::utils::error::{LeafbotError, Result};
use crate::utils::format_millis;
use crate::utils::logging::log_error;

/// A classifier bound to its class names. Never mutated after loading.
#[derive(Debug)]
pub struct LoadedModel<B: Backend> {
    // Modules are Send but not Sync; the lock is held only to clone
    model: Mutex<LeafClassifier<B>>,
    class_names: Vec<String>,
    checkpoint_path: PathBuf,
    device: B::Device,
}

impl<B: Backend> LoadedModel<B> {
    pub fn new(
        model: LeafClassifier<B>,
        class_names: Vec<String>,
        checkpoint_path: PathBuf,
        device: B::Device,
    ) -> Self {
        Self {
            model: Mutex::new(model),
            class_names,
            checkpoint_path,
            device,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Class names in logit order
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Forward pass and softmax for one preprocessed image.
    ///
    /// Runs on a private copy of the model, so calls proceed in parallel.
    pub fn probabilities(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let model = self
            .model
            .lock()
            .map_err(|_| LeafbotError::Prediction("model lock poisoned".to_string()))?
            .clone();

        let batch = input.to_tensor::<B>(&self.device);
        let output = catch_unwind(AssertUnwindSafe(|| model.forward_softmax(batch).into_data()))
            .map_err(|_| LeafbotError::Prediction("forward pass panicked".to_string()))?;

        let probabilities: Vec<f32> = output
            .convert::<f32>()
            .to_vec()
            .map_err(|e| LeafbotError::Prediction(format!("unreadable output: {:?}", e)))?;

        if probabilities.len() != self.num_classes() {
            return Err(LeafbotError::Prediction(format!(
                "model produced {} scores for {} classes",
                probabilities.len(),
                self.num_classes()
            )));
        }

        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(LeafbotError::Prediction(
                "model produced non-finite probabilities".to_string(),
            ));
        }

        Ok(probabilities)
    }
}

/// Single-slot cache for the loaded classifier
pub struct ModelCache<B: Backend> {
    source: Box<dyn CheckpointSource<B>>,
    device: B::Device,
    slot: OnceCell<Arc<LoadedModel<B>>>,
}

impl<B: Backend> ModelCache<B> {
    /// Cache reading `.mpk` checkpoints from disk
    pub fn new(device: B::Device) -> Self {
        Self::with_source(MpkCheckpointSource, device)
    }

    pub fn with_source(source: impl CheckpointSource<B> + 'static, device: B::Device) -> Self {
        Self {
            source: Box::new(source),
            device,
            slot: OnceCell::new(),
        }
    }

    /// Return the loaded model, loading it on first use.
    ///
    /// The slot is bound to the first path that loads successfully; asking
    /// for another path afterwards is a configuration error.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<LoadedModel<B>>> {
        let loaded = self
            .slot
            .get_or_try_init(|| self.load(path).map(Arc::new))
            .map_err(|e| {
                log_error(e.kind(), &e.to_string());
                e
            })?;

        if checkpoint_file(loaded.checkpoint_path()) != checkpoint_file(path) {
            let err = LeafbotError::Config(format!(
                "model cache already holds {:?}, cannot serve {:?}",
                loaded.checkpoint_path(),
                path
            ));
            log_error(err.kind(), &err.to_string());
            return Err(err);
        }

        Ok(Arc::clone(loaded))
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The loaded model, without triggering a load
    pub fn loaded(&self) -> Option<Arc<LoadedModel<B>>> {
        self.slot.get().cloned()
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn load(&self, path: &Path) -> Result<LoadedModel<B>> {
        let start = Instant::now();
        debug!("Loading model from {:?}", path);

        let checkpoint = self.source.read(path, &self.device)?;
        let (model, class_names) = checkpoint.bind(path, &self.device)?;

        info!(
            "Model loaded from {:?}: {} classes in {}",
            path,
            class_names.len(),
            format_millis(start.elapsed().as_secs_f64() * 1000.0)
        );

        Ok(LoadedModel::new(
            model,
            class_names,
            path.to_path_buf(),
            self.device.clone(),
        ))
    }
}
