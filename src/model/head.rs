//! Classification head
//!
//! Three dropout/linear stages mapping the attended feature vector to one raw
//! logit per class. Softmax is left to the caller.

use burn::{
    config::Config,
    module::Module,
    nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the classification head
#[derive(Config, Debug)]
pub struct ClassificationHeadConfig {
    /// Width of the attended feature vector
    pub in_features: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Dropout rate of the first stage; later stages use 0.5x and 0.3x of it
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    #[config(default = "512")]
    pub fc1_units: usize,

    #[config(default = "256")]
    pub fc2_units: usize,
}

impl ClassificationHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassificationHead<B> {
        ClassificationHead {
            dropout1: DropoutConfig::new(self.dropout_rate).init(),
            fc1: LinearConfig::new(self.in_features, self.fc1_units).init(device),
            bn1: BatchNormConfig::new(self.fc1_units).init(device),
            dropout2: DropoutConfig::new(self.dropout_rate * 0.5).init(),
            fc2: LinearConfig::new(self.fc1_units, self.fc2_units).init(device),
            bn2: BatchNormConfig::new(self.fc2_units).init(device),
            dropout3: DropoutConfig::new(self.dropout_rate * 0.3).init(),
            output: LinearConfig::new(self.fc2_units, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    dropout1: Dropout,
    pub fc1: Linear<B>,
    pub bn1: BatchNorm<B>,
    dropout2: Dropout,
    pub fc2: Linear<B>,
    pub bn2: BatchNorm<B>,
    dropout3: Dropout,
    pub output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> ClassificationHead<B> {
    /// # Arguments
    /// * `x` - Attended features of shape [batch_size, in_features]
    ///
    /// # Returns
    /// * Logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout1.forward(x);
        let x = self.fc1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);

        let x = self.dropout2.forward(x);
        let x = self.fc2.forward(x);
        let x = self.bn2.forward(x);
        let x = self.activation.forward(x);

        let x = self.dropout3.forward(x);
        self.output.forward(x)
    }

    /// Output width of the final layer
    pub fn num_classes(&self) -> usize {
        self.output.weight.dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_logits_shape() {
        let device = Default::default();
        let head = ClassificationHeadConfig::new(16, 5).init::<TestBackend>(&device);

        let logits = head.forward(Tensor::<TestBackend, 2>::ones([4, 16], &device));
        assert_eq!(logits.dims(), [4, 5]);
        assert_eq!(head.num_classes(), 5);
    }

    #[test]
    fn test_dropout_schedule() {
        let config = ClassificationHeadConfig::new(16, 5).with_dropout_rate(0.4);
        let head = config.init::<TestBackend>(&Default::default());

        assert!((head.dropout1.prob - 0.4).abs() < 1e-12);
        assert!((head.dropout2.prob - 0.2).abs() < 1e-12);
        assert!((head.dropout3.prob - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_inference_is_deterministic() {
        // Non-autodiff backend: dropout is the identity and batch norm uses running stats
        let device = Default::default();
        let head = ClassificationHeadConfig::new(8, 3).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 2>::ones([1, 8], &device);

        let a: Vec<f32> = head.forward(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = head.forward(input).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
