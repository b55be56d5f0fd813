//! Leaf disease classifier
//!
//! Composition of the three stages:
//! backbone feature map -> pooled features * attention weights -> head logits.

use burn::{
    config::Config,
    module::Module,
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::attention::{AttentionGate, AttentionGateConfig};
use super::backbone::{EfficientNetConfig, FeatureExtractor};
use super::head::{ClassificationHead, ClassificationHeadConfig};

/// Configuration for the full classifier
#[derive(Config, Debug)]
pub struct LeafClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Backbone architecture
    pub backbone: EfficientNetConfig,

    /// Dropout rate of the first head stage
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    #[config(default = "512")]
    pub fc1_units: usize,

    #[config(default = "256")]
    pub fc2_units: usize,

    /// Attention bottleneck reduction factor
    #[config(default = "4")]
    pub attention_reduction: usize,
}

impl LeafClassifierConfig {
    /// EfficientNet-B2 backbone with the default head
    pub fn efficientnet_b2(num_classes: usize) -> Self {
        Self::new(num_classes, EfficientNetConfig::b2())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be greater than 0".to_string());
        }

        if self.backbone.stages.is_empty() {
            return Err("backbone must have at least one stage".to_string());
        }

        if self.dropout_rate < 0.0 || self.dropout_rate >= 1.0 {
            return Err("dropout_rate must be in range [0.0, 1.0)".to_string());
        }

        if self.attention_reduction == 0 {
            return Err("attention_reduction must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> LeafClassifier<B> {
        let backbone = self.backbone.init(device);
        let channels = backbone.out_channels();

        let attention = AttentionGateConfig::new(channels)
            .with_reduction(self.attention_reduction)
            .init(device);

        let head = ClassificationHeadConfig::new(channels, self.num_classes)
            .with_dropout_rate(self.dropout_rate)
            .with_fc1_units(self.fc1_units)
            .with_fc2_units(self.fc2_units)
            .init(device);

        LeafClassifier {
            backbone,
            attention,
            head,
        }
    }
}

#[derive(Module, Debug)]
pub struct LeafClassifier<B: Backend> {
    pub backbone: FeatureExtractor<B>,
    pub attention: AttentionGate<B>,
    pub head: ClassificationHead<B>,
}

impl<B: Backend> LeafClassifier<B> {
    /// # Arguments
    /// * `x` - Normalized images of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);

        // The gate weights the pooled vector, not the spatial map
        let attended = self.attention.forward(features);

        self.head.forward(attended)
    }

    /// Class probabilities over dim 1
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{tiny_config, TestBackend};

    #[test]
    fn test_classifier_output_shape() {
        let device = Default::default();
        let model = tiny_config(4).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 4]);
        assert_eq!(model.num_classes(), 4);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = tiny_config(6).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([3, 3, 32, 32], &device);
        let probs: Vec<f32> = model.forward_softmax(input).into_data().to_vec().unwrap();

        for row in probs.chunks(6) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_forward_composes_stages() {
        let device = Default::default();
        let model = tiny_config(3).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);

        let features = model.backbone.forward(input.clone());
        let staged: Vec<f32> = model
            .head
            .forward(model.attention.forward(features))
            .into_data()
            .to_vec()
            .unwrap();
        let logits: Vec<f32> = model.forward(input).into_data().to_vec().unwrap();

        assert_eq!(logits, staged);
    }

    #[test]
    fn test_config_validation() {
        assert!(tiny_config(3).validate().is_ok());
        assert!(tiny_config(0).validate().is_err());
        assert!(tiny_config(3).with_dropout_rate(1.0).validate().is_err());
        assert!(LeafClassifierConfig::efficientnet_b2(38).validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = LeafClassifierConfig::efficientnet_b2(38);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: LeafClassifierConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.num_classes, 38);
        assert_eq!(parsed.backbone.head_channels, 1408);
        assert_eq!(parsed.backbone.num_blocks(), 23);
    }
}
