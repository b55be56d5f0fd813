//! EfficientNet feature extractor
//!
//! Convolutional backbone built from MBConv blocks (inverted bottleneck with
//! depthwise convolution and squeeze-and-excitation). The pretrained
//! classifier layer is not part of the module: `forward` returns the spatial
//! feature map produced by the final 1x1 convolution.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Tensor,
    },
};

/// One stage of identical MBConv blocks
#[derive(Config, Debug)]
pub struct MbConvStageConfig {
    /// Channel expansion ratio of the inverted bottleneck
    pub expand_ratio: usize,
    /// Depthwise kernel size
    pub kernel_size: usize,
    /// Stride of the first block in the stage
    pub stride: usize,
    /// Output channels of every block in the stage
    pub out_channels: usize,
    /// Number of blocks
    pub num_layers: usize,
}

/// Configuration for the EfficientNet backbone
#[derive(Config, Debug)]
pub struct EfficientNetConfig {
    /// Stages in order, from the stem outwards
    pub stages: Vec<MbConvStageConfig>,

    /// Channels produced by the stem convolution
    #[config(default = "32")]
    pub stem_channels: usize,

    /// Channels of the final 1x1 convolution (the feature dimension)
    #[config(default = "1408")]
    pub head_channels: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

impl EfficientNetConfig {
    /// EfficientNet-B2 (width 1.1, depth 1.2), 1408 output channels
    pub fn b2() -> Self {
        let stage = |expand_ratio, kernel_size, stride, out_channels, num_layers| {
            MbConvStageConfig::new(expand_ratio, kernel_size, stride, out_channels, num_layers)
        };

        Self::new(vec![
            stage(1, 3, 1, 16, 2),
            stage(6, 3, 2, 24, 3),
            stage(6, 5, 2, 48, 3),
            stage(6, 3, 2, 88, 4),
            stage(6, 5, 1, 120, 4),
            stage(6, 5, 2, 208, 5),
            stage(6, 3, 1, 352, 2),
        ])
        .with_stem_channels(32)
        .with_head_channels(1408)
    }

    /// Total number of MBConv blocks
    pub fn num_blocks(&self) -> usize {
        self.stages.iter().map(|s| s.num_layers).sum()
    }

    /// Initialize the backbone
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        let stem = ConvBnAct::new(self.in_channels, self.stem_channels, 3, 2, 1, true, device);

        let mut blocks = Vec::with_capacity(self.num_blocks());
        let mut in_channels = self.stem_channels;
        for stage in &self.stages {
            for layer in 0..stage.num_layers {
                let stride = if layer == 0 { stage.stride } else { 1 };
                blocks.push(MbConvBlock::new(
                    in_channels,
                    stage.out_channels,
                    stage.expand_ratio,
                    stage.kernel_size,
                    stride,
                    device,
                ));
                in_channels = stage.out_channels;
            }
        }

        let head = ConvBnAct::new(in_channels, self.head_channels, 1, 1, 1, true, device);

        FeatureExtractor {
            stem,
            blocks,
            head,
            out_channels: self.head_channels,
        }
    }
}

/// Convolution followed by batch norm and an optional SiLU
#[derive(Module, Debug)]
pub struct ConvBnAct<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    activate: bool,
}

impl<B: Backend> ConvBnAct<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        activate: bool,
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            activate,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        if self.activate {
            silu(x)
        } else {
            x
        }
    }
}

/// Channel squeeze-and-excitation inside an MBConv block
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pool: AdaptiveAvgPool2d,
    reduce: Conv2d<B>,
    expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    fn new(channels: usize, squeeze_channels: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeeze_channels], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeeze_channels, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = silu(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));
        // [B, C, 1, 1] broadcasts over the spatial dims
        x * scale
    }
}

/// Inverted bottleneck block: expand -> depthwise -> SE -> project
#[derive(Module, Debug)]
pub struct MbConvBlock<B: Backend> {
    expand: Option<ConvBnAct<B>>,
    depthwise: ConvBnAct<B>,
    se: SqueezeExcitation<B>,
    project: ConvBnAct<B>,
    use_residual: bool,
}

impl<B: Backend> MbConvBlock<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel_size: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;
        let expand = (expand_ratio != 1)
            .then(|| ConvBnAct::new(in_channels, hidden, 1, 1, 1, true, device));
        let depthwise = ConvBnAct::new(hidden, hidden, kernel_size, stride, hidden, true, device);
        let se = SqueezeExcitation::new(hidden, (in_channels / 4).max(1), device);
        let project = ConvBnAct::new(hidden, out_channels, 1, 1, 1, false, device);

        Self {
            expand,
            depthwise,
            se,
            project,
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => expand.forward(input.clone()),
            None => input.clone(),
        };
        let x = self.depthwise.forward(x);
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        if self.use_residual {
            x + input
        } else {
            x
        }
    }
}

/// Frozen convolutional backbone emitting a spatial feature map
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    pub stem: ConvBnAct<B>,
    pub blocks: Vec<MbConvBlock<B>>,
    pub head: ConvBnAct<B>,
    out_channels: usize,
}

impl<B: Backend> FeatureExtractor<B> {
    /// # Arguments
    /// * `x` - Normalized images of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Feature map of shape [batch_size, out_channels, h, w]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.stem.forward(x);
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        self.head.forward(x)
    }

    /// Channel count of the emitted feature map
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> EfficientNetConfig {
        EfficientNetConfig::new(vec![
            MbConvStageConfig::new(1, 3, 1, 8, 1),
            MbConvStageConfig::new(4, 3, 2, 12, 2),
        ])
        .with_stem_channels(8)
        .with_head_channels(16)
    }

    #[test]
    fn test_b2_preset() {
        let config = EfficientNetConfig::b2();
        assert_eq!(config.head_channels, 1408);
        assert_eq!(config.stem_channels, 32);
        assert_eq!(config.num_blocks(), 23);
        assert_eq!(config.stages.last().map(|s| s.out_channels), Some(352));
    }

    #[test]
    fn test_feature_map_shape() {
        let device = Default::default();
        let backbone = tiny_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let features = backbone.forward(input);

        // stem stride 2 and one stride-2 stage: 32 -> 16 -> 8
        assert_eq!(features.dims(), [2, 16, 8, 8]);
        assert_eq!(backbone.out_channels(), 16);
    }

    #[test]
    fn test_residual_only_when_shapes_match() {
        let device = Default::default();
        let backbone = tiny_config().init::<TestBackend>(&device);

        assert_eq!(backbone.blocks.len(), 3);
        assert!(backbone.blocks[0].use_residual);
        assert!(!backbone.blocks[1].use_residual);
        assert!(backbone.blocks[2].use_residual);
        assert!(backbone.blocks[0].expand.is_none());
        assert!(backbone.blocks[1].expand.is_some());
    }
}
