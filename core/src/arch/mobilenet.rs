//! MobileNetV3-Large feature extractor with a two-layer regression head
//!
//! Feature parameters follow torchvision's `features.N` naming and live
//! under the `model.` prefix; the head is `fc1` → ReLU → dropout → `fc2`.

use candle_core::{Result, Tensor, D};
use candle_nn::{
    batch_norm, conv2d, conv2d_no_bias, linear, BatchNorm, Conv2d, Conv2dConfig, Linear,
    VarBuilder,
};

const BN_EPS: f64 = 1e-3;

/// Width of the final feature map
pub const FEATURE_DIM: usize = 960;

/// Width of the hidden regression layer
pub const HIDDEN_DIM: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Relu,
    Hardswish,
}

/// One inverted-residual row: kernel, expanded, out, squeeze-excite, activation, stride
type Bneck = (usize, usize, usize, bool, Activation, usize);

const BNECK: [Bneck; 15] = {
    use Activation::{Hardswish as HS, Relu as RE};
    [
        (3, 16, 16, false, RE, 1),
        (3, 64, 24, false, RE, 2),
        (3, 72, 24, false, RE, 1),
        (5, 72, 40, true, RE, 2),
        (5, 120, 40, true, RE, 1),
        (5, 120, 40, true, RE, 1),
        (3, 240, 80, false, HS, 2),
        (3, 200, 80, false, HS, 1),
        (3, 184, 80, false, HS, 1),
        (3, 184, 80, false, HS, 1),
        (3, 480, 112, true, HS, 1),
        (3, 672, 112, true, HS, 1),
        (5, 672, 160, true, HS, 2),
        (5, 960, 160, true, HS, 1),
        (5, 960, 160, true, HS, 1),
    ]
};

/// Rounds `v` to a multiple of 8 without dropping more than 10%
fn make_divisible(v: usize) -> usize {
    let rounded = ((v + 4) / 8 * 8).max(8);
    if (rounded as f64) < 0.9 * v as f64 {
        rounded + 8
    } else {
        rounded
    }
}

fn relu6(xs: &Tensor) -> Result<Tensor> {
    xs.clamp(0f32, 6f32)
}

fn hardsigmoid(xs: &Tensor) -> Result<Tensor> {
    relu6(&(xs + 3.0)?)? / 6.0
}

fn hardswish(xs: &Tensor) -> Result<Tensor> {
    xs * hardsigmoid(xs)?
}

/// Conv → BatchNorm → optional activation, named `.0` / `.1`
#[derive(Debug)]
struct ConvNormAct {
    conv: Conv2d,
    bn: BatchNorm,
    act: Option<Activation>,
}

impl ConvNormAct {
    fn new(
        c_in: usize,
        c_out: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        act: Option<Activation>,
        vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: (kernel - 1) / 2,
            stride,
            groups,
            ..Default::default()
        };
        Ok(Self {
            conv: conv2d_no_bias(c_in, c_out, kernel, cfg, vb.pp("0"))?,
            bn: batch_norm(c_out, BN_EPS, vb.pp("1"))?,
            act,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = xs.apply(&self.conv)?.apply_t(&self.bn, false)?;
        match self.act {
            Some(Activation::Relu) => xs.relu(),
            Some(Activation::Hardswish) => hardswish(&xs),
            None => Ok(xs),
        }
    }
}

#[derive(Debug)]
struct SqueezeExcitation {
    fc1: Conv2d,
    fc2: Conv2d,
}

impl SqueezeExcitation {
    fn new(channels: usize, squeeze: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            fc1: conv2d(channels, squeeze, 1, Default::default(), vb.pp("fc1"))?,
            fc2: conv2d(squeeze, channels, 1, Default::default(), vb.pp("fc2"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let scale = xs
            .mean_keepdim(D::Minus1)?
            .mean_keepdim(D::Minus2)?
            .apply(&self.fc1)?
            .relu()?
            .apply(&self.fc2)?;
        xs.broadcast_mul(&hardsigmoid(&scale)?)
    }
}

#[derive(Debug)]
enum Stage {
    Conv(ConvNormAct),
    SqueezeExcite(SqueezeExcitation),
}

#[derive(Debug)]
struct InvertedResidual {
    stages: Vec<Stage>,
    residual: bool,
}

impl InvertedResidual {
    fn new(c_in: usize, row: &Bneck, vb: VarBuilder) -> Result<Self> {
        let &(kernel, expanded, c_out, se, act, stride) = row;
        let vb = vb.pp("block");
        let mut stages = Vec::with_capacity(4);
        if expanded != c_in {
            stages.push(Stage::Conv(ConvNormAct::new(
                c_in,
                expanded,
                1,
                1,
                1,
                Some(act),
                vb.pp(stages.len()),
            )?));
        }
        stages.push(Stage::Conv(ConvNormAct::new(
            expanded,
            expanded,
            kernel,
            stride,
            expanded,
            Some(act),
            vb.pp(stages.len()),
        )?));
        if se {
            stages.push(Stage::SqueezeExcite(SqueezeExcitation::new(
                expanded,
                make_divisible(expanded / 4),
                vb.pp(stages.len()),
            )?));
        }
        stages.push(Stage::Conv(ConvNormAct::new(
            expanded,
            c_out,
            1,
            1,
            1,
            None,
            vb.pp(stages.len()),
        )?));
        Ok(Self {
            stages,
            residual: stride == 1 && c_in == c_out,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut ys = xs.clone();
        for stage in &self.stages {
            ys = match stage {
                Stage::Conv(c) => c.forward(&ys)?,
                Stage::SqueezeExcite(se) => se.forward(&ys)?,
            };
        }
        if self.residual {
            ys + xs
        } else {
            Ok(ys)
        }
    }
}

/// MobileNetV3-Large backbone with a single-output regression head
#[derive(Debug)]
pub struct MobileNetV3Regressor {
    stem: ConvNormAct,
    blocks: Vec<InvertedResidual>,
    last: ConvNormAct,
    fc1: Linear,
    fc2: Linear,
}

impl MobileNetV3Regressor {
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let features = vb.pp("model.features");
        let stem = ConvNormAct::new(3, 16, 3, 2, 1, Some(Activation::Hardswish), features.pp(0))?;
        let mut c_in = 16;
        let mut blocks = Vec::with_capacity(BNECK.len());
        for (i, row) in BNECK.iter().enumerate() {
            blocks.push(InvertedResidual::new(c_in, row, features.pp(i + 1))?);
            c_in = row.2;
        }
        let last = ConvNormAct::new(
            c_in,
            FEATURE_DIM,
            1,
            1,
            1,
            Some(Activation::Hardswish),
            features.pp(BNECK.len() + 1),
        )?;
        Ok(Self {
            stem,
            blocks,
            last,
            fc1: linear(FEATURE_DIM, HIDDEN_DIM, vb.pp("fc1"))?,
            fc2: linear(HIDDEN_DIM, 1, vb.pp("fc2"))?,
        })
    }

    /// Returns `(batch, 1)` regression outputs
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = self.stem.forward(xs)?;
        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }
        self.last
            .forward(&xs)?
            .mean(D::Minus1)?
            .mean(D::Minus1)?
            .apply(&self.fc1)?
            .relu()?
            .apply(&self.fc2)
    }
}
