//! Inference Predictor Module
//!
//! The entry point for callers: image bytes in, ranked class labels out.
//! Each call goes cache -> preprocess -> forward -> softmax -> top-k.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cache::{LoadedModel, ModelCache};
use super::preprocess::PreprocessingPipeline;
use crate::config::InferenceConfig;
use crate::utils::error::Result;
use crate::utils::logging::log_error;
use crate::DEFAULT_TOP_K;

/// One ranked class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f32,
}

/// Ranked labels, highest score first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predictions: Vec<ScoredLabel>,
}

impl PredictionResult {
    pub fn top(&self) -> Option<&ScoredLabel> {
        self.predictions.first()
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Copy with every score rounded to `decimals` places
    pub fn rounded(&self, decimals: u32) -> Self {
        let factor = 10f32.powi(decimals as i32);
        Self {
            predictions: self
                .predictions
                .iter()
                .map(|p| ScoredLabel {
                    label: p.label.clone(),
                    score: (p.score * factor).round() / factor,
                })
                .collect(),
        }
    }
}

/// Indices and scores of the `k` highest probabilities.
///
/// Sorted by score descending; equal scores keep ascending index order.
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    // Stable sort keeps index order among ties
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}

/// Predictor for one checkpoint, sharing a model cache
pub struct Predictor<B: Backend> {
    cache: Arc<ModelCache<B>>,
    checkpoint_path: PathBuf,
    preprocessor: PreprocessingPipeline,
    top_k: usize,
}

impl<B: Backend> Predictor<B> {
    pub fn new(cache: Arc<ModelCache<B>>, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            checkpoint_path: checkpoint_path.into(),
            preprocessor: PreprocessingPipeline::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Build from a validated configuration
    pub fn from_config(config: &InferenceConfig, cache: Arc<ModelCache<B>>) -> Result<Self> {
        config.validate()?;
        let checkpoint_path = config.checkpoint_path()?.to_path_buf();

        Ok(Self {
            cache,
            checkpoint_path,
            preprocessor: PreprocessingPipeline::new(config.image_size as usize),
            top_k: config.top_k,
        })
    }

    pub fn with_preprocessor(mut self, preprocessor: PreprocessingPipeline) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// The shared model, loading it if needed
    pub fn model(&self) -> Result<Arc<LoadedModel<B>>> {
        self.cache.get_or_load(&self.checkpoint_path)
    }

    /// Top `k` labels for an encoded image
    pub fn predict(&self, image_bytes: &[u8], k: usize) -> Result<PredictionResult> {
        let (model, probabilities) = self.run(image_bytes)?;

        let predictions = top_k(&probabilities, k)
            .into_iter()
            .map(|(index, score)| ScoredLabel {
                label: model.class_names()[index].clone(),
                score,
            })
            .collect::<Vec<_>>();

        if let Some(best) = predictions.first() {
            debug!("Predicted {} ({:.4})", best.label, best.score);
        }

        Ok(PredictionResult { predictions })
    }

    /// Top labels using the configured k (3 unless overridden)
    pub fn predict_default(&self, image_bytes: &[u8]) -> Result<PredictionResult> {
        self.predict(image_bytes, self.top_k)
    }

    /// Full probability vector in class order
    pub fn distribution(&self, image_bytes: &[u8]) -> Result<Vec<f32>> {
        self.run(image_bytes).map(|(_, probabilities)| probabilities)
    }

    fn run(&self, image_bytes: &[u8]) -> Result<(Arc<LoadedModel<B>>, Vec<f32>)> {
        let model = self.model()?;

        let probabilities = self
            .preprocessor
            .process(image_bytes)
            .and_then(|input| model.probabilities(&input))
            .map_err(|e| {
                log_error(e.kind(), &e.to_string());
                e
            })?;

        Ok((model, probabilities))
    }
}
