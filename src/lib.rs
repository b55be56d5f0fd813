//! # LeafBot
//!
//! Inference core for plant leaf disease classification with the Burn framework.
//!
//! ## Features
//!
//! - **EfficientNet backbone** with a channel attention gate and a dropout/batch-norm head
//! - **Self-describing checkpoints** carrying class names, architecture and weights
//! - **Load-once model cache** shared by concurrent predictions
//! - **Typed errors** with a structured `{kind, message}` form for callers
//!
//! ## Modules
//!
//! - `model`: classifier architecture and checkpoint format
//! - `inference`: preprocessing, model cache and predictor
//! - `config`: runtime configuration from JSON and environment
//! - `backend`: compile-time backend selection (NdArray or CUDA)
//! - `utils`: logging and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use leafbot::backend::{default_device, InferenceBackend};
//! use leafbot::inference::{ModelCache, Predictor};
//!
//! let cache = Arc::new(ModelCache::<InferenceBackend>::new(default_device()));
//! let predictor = Predictor::new(cache, "models/plant_disease_model.mpk");
//!
//! let bytes = std::fs::read("leaf.jpg")?;
//! for p in predictor.predict_default(&bytes)?.predictions {
//!     println!("{}: {:.4}", p.label, p.score);
//! }
//! ```

pub mod backend;
pub mod config;
pub mod inference;
pub mod model;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used items for convenience
pub use config::InferenceConfig;
pub use inference::{ModelCache, PredictionResult, Predictor, ScoredLabel};
pub use model::{LeafClassifier, LeafClassifierConfig, ModelCheckpoint};
pub use utils::error::{ErrorKind, ErrorReport, LeafbotError, Result};

/// Default side of the square model input
pub const IMAGE_SIZE: usize = 224;

/// Default number of ranked labels per prediction
pub const DEFAULT_TOP_K: usize = 3;

/// RGB input channels
pub const NUM_CHANNELS: usize = 3;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
