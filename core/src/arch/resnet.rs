//! Bottleneck ResNet with torchvision parameter names

use candle_core::{Result, Tensor, D};
use candle_nn::{batch_norm, conv2d_no_bias, linear, BatchNorm, Conv2d, Conv2dConfig, Linear, VarBuilder};

const EXPANSION: usize = 4;
const BN_EPS: f64 = 1e-5;

/// Stage depths and widths of a bottleneck ResNet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResNetConfig {
    /// Bottleneck blocks per stage
    pub blocks: [usize; 4],
    /// Planes of the first stage; doubled at each following stage
    pub base_width: usize,
    /// Outputs of the `fc` head
    pub num_classes: usize,
}

impl ResNetConfig {
    /// Standard ResNet-50
    pub fn resnet50(num_classes: usize) -> Self {
        Self {
            blocks: [3, 4, 6, 3],
            base_width: 64,
            num_classes,
        }
    }

    /// Width of the pooled feature vector
    pub fn feature_dim(&self) -> usize {
        self.base_width * 8 * EXPANSION
    }
}

fn conv(c_in: usize, c_out: usize, k: usize, stride: usize, padding: usize, vb: VarBuilder) -> Result<Conv2d> {
    let cfg = Conv2dConfig {
        stride,
        padding,
        ..Default::default()
    };
    conv2d_no_bias(c_in, c_out, k, cfg, vb)
}

#[derive(Debug)]
struct Bottleneck {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    conv3: Conv2d,
    bn3: BatchNorm,
    downsample: Option<(Conv2d, BatchNorm)>,
}

impl Bottleneck {
    fn new(c_in: usize, planes: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let c_out = planes * EXPANSION;
        let downsample = if stride != 1 || c_in != c_out {
            Some((
                conv(c_in, c_out, 1, stride, 0, vb.pp("downsample.0"))?,
                batch_norm(c_out, BN_EPS, vb.pp("downsample.1"))?,
            ))
        } else {
            None
        };
        Ok(Self {
            conv1: conv(c_in, planes, 1, 1, 0, vb.pp("conv1"))?,
            bn1: batch_norm(planes, BN_EPS, vb.pp("bn1"))?,
            conv2: conv(planes, planes, 3, stride, 1, vb.pp("conv2"))?,
            bn2: batch_norm(planes, BN_EPS, vb.pp("bn2"))?,
            conv3: conv(planes, c_out, 1, 1, 0, vb.pp("conv3"))?,
            bn3: batch_norm(c_out, BN_EPS, vb.pp("bn3"))?,
            downsample,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = xs.apply(&self.conv1)?.apply_t(&self.bn1, false)?.relu()?;
        let ys = ys.apply(&self.conv2)?.apply_t(&self.bn2, false)?.relu()?;
        let ys = ys.apply(&self.conv3)?.apply_t(&self.bn3, false)?;
        let identity = match &self.downsample {
            Some((conv, bn)) => xs.apply(conv)?.apply_t(bn, false)?,
            None => xs.clone(),
        };
        (ys + identity)?.relu()
    }
}

/// Bottleneck ResNet classifier over NCHW input
#[derive(Debug)]
pub struct ResNet {
    conv1: Conv2d,
    bn1: BatchNorm,
    layers: Vec<Vec<Bottleneck>>,
    fc: Linear,
}

impl ResNet {
    pub fn new(config: &ResNetConfig, vb: VarBuilder) -> Result<Self> {
        let conv1 = conv(3, config.base_width, 7, 2, 3, vb.pp("conv1"))?;
        let bn1 = batch_norm(config.base_width, BN_EPS, vb.pp("bn1"))?;

        let mut c_in = config.base_width;
        let mut layers = Vec::with_capacity(4);
        for (stage, &depth) in config.blocks.iter().enumerate() {
            let planes = config.base_width << stage;
            let stride = if stage == 0 { 1 } else { 2 };
            let vb_stage = vb.pp(format!("layer{}", stage + 1));
            let mut blocks = Vec::with_capacity(depth);
            for i in 0..depth {
                let block_stride = if i == 0 { stride } else { 1 };
                blocks.push(Bottleneck::new(c_in, planes, block_stride, vb_stage.pp(i))?);
                c_in = planes * EXPANSION;
            }
            layers.push(blocks);
        }
        let fc = linear(config.feature_dim(), config.num_classes, vb.pp("fc"))?;
        Ok(Self { conv1, bn1, layers, fc })
    }

    /// Returns `(batch, num_classes)` logits
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = xs.apply(&self.conv1)?.apply_t(&self.bn1, false)?.relu()?;
        // Zero padding is neutral for max pooling of non-negative activations
        let mut xs = xs
            .pad_with_zeros(2, 1, 1)?
            .pad_with_zeros(3, 1, 1)?
            .max_pool2d_with_stride(3, 2)?;
        for stage in &self.layers {
            for block in stage {
                xs = block.forward(&xs)?;
            }
        }
        xs.mean(D::Minus1)?.mean(D::Minus1)?.apply(&self.fc)
    }
}
