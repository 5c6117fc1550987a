//! Vision transformer with torchvision parameter names

use candle_core::{IndexOp, Result, Tensor, D};
use candle_nn::{
    conv2d, layer_norm, linear, Conv2d, Conv2dConfig, LayerNorm, LayerNormConfig, Linear,
    VarBuilder,
};

const LN_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VitConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub mlp_dim: usize,
    pub num_classes: usize,
}

impl VitConfig {
    /// ViT-B/16 at 224 px
    pub fn vit_b_16(num_classes: usize) -> Self {
        Self {
            image_size: 224,
            patch_size: 16,
            hidden_dim: 768,
            num_layers: 12,
            num_heads: 12,
            mlp_dim: 3072,
            num_classes,
        }
    }

    /// Patch tokens plus the class token
    pub fn seq_len(&self) -> usize {
        let per_side = self.image_size / self.patch_size;
        per_side * per_side + 1
    }
}

fn ln(dim: usize, vb: VarBuilder) -> Result<LayerNorm> {
    let cfg = LayerNormConfig {
        eps: LN_EPS,
        ..Default::default()
    };
    layer_norm(dim, cfg, vb)
}

#[derive(Debug)]
struct SelfAttention {
    in_proj_weight: Tensor,
    in_proj_bias: Tensor,
    out_proj: Linear,
    num_heads: usize,
}

impl SelfAttention {
    fn new(dim: usize, num_heads: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            in_proj_weight: vb.get((3 * dim, dim), "in_proj_weight")?,
            in_proj_bias: vb.get(3 * dim, "in_proj_bias")?,
            out_proj: linear(dim, dim, vb.pp("out_proj"))?,
            num_heads,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, n, d) = xs.dims3()?;
        let head_dim = d / self.num_heads;
        let qkv = xs
            .broadcast_matmul(&self.in_proj_weight.t()?)?
            .broadcast_add(&self.in_proj_bias)?
            .reshape((b, n, 3, self.num_heads, head_dim))?
            .permute((2, 0, 3, 1, 4))?;
        let q = qkv.i(0)?.contiguous()?;
        let k = qkv.i(1)?.contiguous()?;
        let v = qkv.i(2)?.contiguous()?;

        let scale = 1.0 / (head_dim as f64).sqrt();
        let attn = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
        let attn = candle_nn::ops::softmax_last_dim(&attn)?;
        attn.matmul(&v)?
            .transpose(1, 2)?
            .reshape((b, n, d))?
            .apply(&self.out_proj)
    }
}

#[derive(Debug)]
struct EncoderBlock {
    ln_1: LayerNorm,
    self_attention: SelfAttention,
    ln_2: LayerNorm,
    mlp_fc1: Linear,
    mlp_fc2: Linear,
}

impl EncoderBlock {
    fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self> {
        let d = config.hidden_dim;
        Ok(Self {
            ln_1: ln(d, vb.pp("ln_1"))?,
            self_attention: SelfAttention::new(d, config.num_heads, vb.pp("self_attention"))?,
            ln_2: ln(d, vb.pp("ln_2"))?,
            mlp_fc1: linear(d, config.mlp_dim, vb.pp("mlp.0"))?,
            mlp_fc2: linear(config.mlp_dim, d, vb.pp("mlp.3"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = self.self_attention.forward(&xs.apply(&self.ln_1)?)?;
        let xs = (xs + ys)?;
        let ys = xs
            .apply(&self.ln_2)?
            .apply(&self.mlp_fc1)?
            .gelu_erf()?
            .apply(&self.mlp_fc2)?;
        xs + ys
    }
}

/// Vision transformer classifier over NCHW input
///
/// The head sits at `heads.head.1`, behind a dropout at index 0.
#[derive(Debug)]
pub struct VisionTransformer {
    conv_proj: Conv2d,
    class_token: Tensor,
    pos_embedding: Tensor,
    layers: Vec<EncoderBlock>,
    ln: LayerNorm,
    head: Linear,
}

impl VisionTransformer {
    pub fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self> {
        let d = config.hidden_dim;
        let proj_cfg = Conv2dConfig {
            stride: config.patch_size,
            ..Default::default()
        };
        let vb_enc = vb.pp("encoder");
        let layers = (0..config.num_layers)
            .map(|i| EncoderBlock::new(config, vb_enc.pp(format!("layers.encoder_layer_{}", i))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            conv_proj: conv2d(3, d, config.patch_size, proj_cfg, vb.pp("conv_proj"))?,
            class_token: vb.get((1, 1, d), "class_token")?,
            pos_embedding: vb_enc.get((1, config.seq_len(), d), "pos_embedding")?,
            layers,
            ln: ln(d, vb_enc.pp("ln"))?,
            head: linear(d, config.num_classes, vb.pp("heads.head.1"))?,
        })
    }

    /// Returns `(batch, num_classes)` logits
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, _, _, _) = xs.dims4()?;
        let patches = xs.apply(&self.conv_proj)?.flatten_from(2)?.transpose(1, 2)?;
        let d = patches.dim(D::Minus1)?;
        let cls = self.class_token.broadcast_as((b, 1, d))?.contiguous()?;
        let mut xs = Tensor::cat(&[&cls, &patches.contiguous()?], 1)?
            .broadcast_add(&self.pos_embedding)?;
        for layer in &self.layers {
            xs = layer.forward(&xs)?;
        }
        xs.apply(&self.ln)?.i((.., 0))?.apply(&self.head)
    }
}
