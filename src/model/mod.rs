//! Model module for the leaf disease classifier
//!
//! The classifier is three stages in sequence:
//! - `backbone`: EfficientNet feature extractor (spatial feature map)
//! - `attention`: channel gate over the pooled features
//! - `head`: dropout/linear/batch-norm stack producing raw logits
//!
//! `checkpoint` persists the weights together with the class names.

pub mod attention;
pub mod backbone;
pub mod checkpoint;
pub mod classifier;
pub mod head;

pub use attention::{AttentionGate, AttentionGateConfig};
pub use backbone::{EfficientNetConfig, FeatureExtractor, MbConvStageConfig};
pub use checkpoint::{CheckpointSource, ModelCheckpoint, MpkCheckpointSource};
pub use classifier::{LeafClassifier, LeafClassifierConfig};
pub use head::{ClassificationHead, ClassificationHeadConfig};
