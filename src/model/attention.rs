//! Channel attention gate
//!
//! Squeeze-and-excite style gate over the backbone's feature channels:
//! global average pool, bottleneck (reduce, ReLU, expand) and a sigmoid,
//! giving one weight in [0, 1] per channel. The weights rescale the pooled
//! feature vector before it reaches the classification head.

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

/// Configuration for the attention gate
#[derive(Config, Debug)]
pub struct AttentionGateConfig {
    /// Feature channels entering the gate
    pub channels: usize,

    /// Bottleneck reduction factor
    #[config(default = "4")]
    pub reduction: usize,
}

impl AttentionGateConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionGate<B> {
        let hidden = (self.channels / self.reduction).max(1);

        AttentionGate {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: LinearConfig::new(self.channels, hidden).init(device),
            activation: Relu::new(),
            expand: LinearConfig::new(hidden, self.channels).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct AttentionGate<B: Backend> {
    pool: AdaptiveAvgPool2d,
    pub reduce: Linear<B>,
    activation: Relu,
    pub expand: Linear<B>,
}

impl<B: Backend> AttentionGate<B> {
    /// Pool the feature map once and rescale it by its channel weights
    ///
    /// # Arguments
    /// * `features` - Backbone feature map of shape [batch_size, channels, h, w]
    ///
    /// # Returns
    /// * Attended feature vector of shape [batch_size, channels]
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let pooled = global_avg_pool(&self.pool, features);
        let weights = self.weights(pooled.clone());
        pooled * weights
    }

    /// Per-channel weights from a pooled feature vector [B, C] -> [B, C]
    pub fn weights(&self, pooled: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.reduce.forward(pooled);
        let x = self.activation.forward(x);
        let x = self.expand.forward(x);
        sigmoid(x)
    }
}

/// Global average pooling flattened to [B, C]
fn global_avg_pool<B: Backend>(pool: &AdaptiveAvgPool2d, x: Tensor<B, 4>) -> Tensor<B, 2> {
    let x = pool.forward(x);
    let [batch_size, channels, _, _] = x.dims();
    x.reshape([batch_size, channels])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_weights_shape_and_range() {
        let device = Default::default();
        let gate = AttentionGateConfig::new(16).init::<TestBackend>(&device);

        let pooled = Tensor::<TestBackend, 2>::random(
            [3, 16],
            Distribution::Uniform(-4.0, 4.0),
            &device,
        );
        let weights = gate.weights(pooled);
        assert_eq!(weights.dims(), [3, 16]);

        let values: Vec<f32> = weights.into_data().to_vec().unwrap();
        assert!(values.iter().all(|w| (0.0..=1.0).contains(w)));
    }

    #[test]
    fn test_bottleneck_width() {
        let device = Default::default();
        let gate = AttentionGateConfig::new(32).init::<TestBackend>(&device);
        assert_eq!(gate.reduce.weight.dims(), [32, 8]);
        assert_eq!(gate.expand.weight.dims(), [8, 32]);
    }

    #[test]
    fn test_forward_scales_pooled_features() {
        let device = Default::default();
        let gate = AttentionGateConfig::new(4).init::<TestBackend>(&device);

        // Constant map: pooled value equals the constant
        let features = Tensor::<TestBackend, 4>::ones([1, 4, 3, 3], &device).mul_scalar(2.0);
        let pooled = Tensor::<TestBackend, 2>::ones([1, 4], &device).mul_scalar(2.0);
        let weights: Vec<f32> = gate.weights(pooled).into_data().to_vec().unwrap();
        let attended: Vec<f32> = gate.forward(features).into_data().to_vec().unwrap();

        for (a, w) in attended.iter().zip(weights.iter()) {
            assert!((a - 2.0 * w).abs() < 1e-6);
        }
    }
}
