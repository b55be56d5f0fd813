//! Inference module: from encoded image bytes to ranked class labels
//!
//! This module provides:
//! - `preprocess`: decoding, resizing and ImageNet normalization
//! - `cache`: the single-slot, load-once model cache
//! - `predictor`: softmax and top-k over the cached classifier
//!
//! A `Predictor` shares its `ModelCache` through an `Arc`, so any number of
//! threads can predict against one loaded model.

pub mod cache;
pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use cache::{LoadedModel, ModelCache};
pub use predictor::{top_k, PredictionResult, Predictor, ScoredLabel};
pub use preprocess::{ImageTensor, PreprocessingPipeline, IMAGENET_MEAN, IMAGENET_STD};

/// Decimal places scores are rounded to for display
pub const SCORE_DECIMALS: u32 = 4;
