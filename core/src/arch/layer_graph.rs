//! Interpreter for Keras-style sequential layer graphs
//!
//! The graph is described by a `model.to_json()` document and its weights
//! by a safetensors file keyed `<layer>/<weight>`. Input and output follow
//! the channels-last convention; internally tensors are kept channels-first.

use crate::error::{Result, RetinaError};
use candle_core::{Device, Tensor, D};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct ModelJson {
    config: ModelConfig,
}

#[derive(Debug, Deserialize)]
struct ModelConfig {
    layers: Vec<LayerJson>,
}

#[derive(Debug, Deserialize)]
struct LayerJson {
    class_name: String,
    #[serde(default)]
    config: Value,
}

impl LayerJson {
    fn name(&self) -> &str {
        self.config.get("name").and_then(Value::as_str).unwrap_or("")
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.config.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.config.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.config.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Reads an `(h, w)` pair given either as a list or a single integer
    fn pair(&self, key: &str) -> Option<(usize, usize)> {
        match self.config.get(key)? {
            Value::Array(items) if items.len() == 2 => {
                Some((items[0].as_u64()? as usize, items[1].as_u64()? as usize))
            }
            Value::Number(n) => n.as_u64().map(|v| (v as usize, v as usize)),
            _ => None,
        }
    }

    fn input_shape(&self) -> Option<Vec<Option<usize>>> {
        let shape = self
            .config
            .get("batch_input_shape")
            .or_else(|| self.config.get("batch_shape"))?
            .as_array()?;
        Some(shape.iter().map(|v| v.as_u64().map(|d| d as usize)).collect())
    }
}

/// Element-wise or distribution activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Softmax,
    Tanh,
    Swish,
    Gelu,
}

impl Activation {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "linear" => Ok(Activation::Linear),
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "softmax" => Ok(Activation::Softmax),
            "tanh" => Ok(Activation::Tanh),
            "swish" | "silu" => Ok(Activation::Swish),
            "gelu" => Ok(Activation::Gelu),
            other => Err(RetinaError::ArtifactError(format!(
                "unsupported activation '{}'",
                other
            ))),
        }
    }

    fn apply(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Linear => Ok(xs.clone()),
            Activation::Relu => xs.relu(),
            Activation::Sigmoid => candle_nn::ops::sigmoid(xs),
            Activation::Softmax => {
                // channels-first maps normalize over the channel axis
                let dim = if xs.rank() == 4 { 1 } else { xs.rank() - 1 };
                candle_nn::ops::softmax(xs, dim)
            }
            Activation::Tanh => xs.tanh(),
            Activation::Swish => candle_nn::ops::silu(xs),
            Activation::Gelu => xs.gelu_erf(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Padding {
    Valid,
    Same,
}

impl Padding {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "valid" => Ok(Padding::Valid),
            "same" => Ok(Padding::Same),
            other => Err(RetinaError::ArtifactError(format!(
                "unsupported padding '{}'",
                other
            ))),
        }
    }
}

/// Leading and trailing padding that makes a window cover `size` like TF "same"
fn same_padding(size: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out = size.div_ceil(stride);
    let total = ((out - 1) * stride + kernel).saturating_sub(size);
    (total / 2, total - total / 2)
}

#[derive(Debug)]
enum Layer {
    Conv2D {
        kernel: Tensor,
        bias: Option<Tensor>,
        stride: usize,
        padding: Padding,
        activation: Activation,
    },
    MaxPool {
        pool: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    },
    AvgPool {
        pool: (usize, usize),
        strides: (usize, usize),
    },
    GlobalAvgPool,
    GlobalMaxPool,
    Flatten,
    Dense {
        kernel: Tensor,
        bias: Option<Tensor>,
        activation: Activation,
    },
    /// Inference-time batch normalization folded into `x * scale + shift`
    BatchNorm {
        scale: Tensor,
        shift: Tensor,
    },
    Activation(Activation),
    Rescaling {
        scale: f64,
        offset: f64,
    },
}

impl Layer {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Layer::Conv2D {
                kernel,
                bias,
                stride,
                padding,
                activation,
            } => {
                let (_, _, kh, kw) = kernel.dims4()?;
                let xs = match padding {
                    Padding::Valid => xs.clone(),
                    Padding::Same => {
                        let (_, _, h, w) = xs.dims4()?;
                        let (top, bottom) = same_padding(h, kh, *stride);
                        let (left, right) = same_padding(w, kw, *stride);
                        xs.pad_with_zeros(2, top, bottom)?.pad_with_zeros(3, left, right)?
                    }
                };
                let mut ys = xs.conv2d(kernel, 0, *stride, 1, 1)?;
                if let Some(bias) = bias {
                    ys = ys.broadcast_add(&bias.reshape((1, (), 1, 1))?)?;
                }
                activation.apply(&ys)
            }
            Layer::MaxPool {
                pool,
                strides,
                padding,
            } => {
                let xs = match padding {
                    Padding::Valid => xs.clone(),
                    Padding::Same => {
                        // edge replication never changes a window maximum
                        let (_, _, h, w) = xs.dims4()?;
                        let (top, bottom) = same_padding(h, pool.0, strides.0);
                        let (left, right) = same_padding(w, pool.1, strides.1);
                        xs.pad_with_same(2, top, bottom)?.pad_with_same(3, left, right)?
                    }
                };
                xs.max_pool2d_with_stride(*pool, *strides)
            }
            Layer::AvgPool { pool, strides } => xs.avg_pool2d_with_stride(*pool, *strides),
            Layer::GlobalAvgPool => xs.mean(D::Minus1)?.mean(D::Minus1),
            Layer::GlobalMaxPool => xs.max(D::Minus1)?.max(D::Minus1),
            Layer::Flatten => match xs.rank() {
                4 => xs.permute((0, 2, 3, 1))?.flatten_from(1),
                _ => xs.flatten_from(1),
            },
            Layer::Dense {
                kernel,
                bias,
                activation,
            } => {
                let mut ys = xs.matmul(kernel)?;
                if let Some(bias) = bias {
                    ys = ys.broadcast_add(bias)?;
                }
                activation.apply(&ys)
            }
            Layer::BatchNorm { scale, shift } => {
                let shape: Vec<usize> = match xs.rank() {
                    4 => vec![1, scale.elem_count(), 1, 1],
                    _ => vec![1, scale.elem_count()],
                };
                xs.broadcast_mul(&scale.reshape(shape.as_slice())?)?
                    .broadcast_add(&shift.reshape(shape.as_slice())?)
            }
            Layer::Activation(activation) => activation.apply(xs),
            Layer::Rescaling { scale, offset } => xs.affine(*scale, *offset),
        }
    }
}

/// Weights of a graph, consumed layer by layer
struct WeightStore {
    tensors: HashMap<String, Tensor>,
}

impl WeightStore {
    fn take(&mut self, layer: &str, weight: &str) -> Result<Tensor> {
        let key = format!("{}/{}", layer, weight);
        self.tensors
            .remove(&key)
            .ok_or_else(|| RetinaError::ArtifactError(format!("missing weight '{}'", key)))
    }

    fn take_if(&mut self, enabled: bool, layer: &str, weight: &str) -> Result<Option<Tensor>> {
        if enabled {
            self.take(layer, weight).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Sequential layer graph over channels-last input
#[derive(Debug)]
pub struct LayerGraph {
    layers: Vec<Layer>,
    input_shape: (usize, usize, usize),
}

impl LayerGraph {
    /// Builds the graph from `<stem>.json` and `<stem>.safetensors`
    ///
    /// # Errors
    ///
    /// Returns [`RetinaError::ArtifactError`] when either file is missing,
    /// the description uses unsupported layers, or weights are absent or
    /// misshapen.
    pub fn load(config_path: &Path, device: &Device) -> Result<Self> {
        let weights_path = weights_path(config_path);
        for path in [config_path, weights_path.as_path()] {
            if !path.is_file() {
                return Err(RetinaError::ArtifactError(format!(
                    "layer graph file not found: {}",
                    path.display()
                )));
            }
        }
        let json = std::fs::read_to_string(config_path)?;
        let tensors = candle_core::safetensors::load(&weights_path, device)?;
        Self::from_parts(&json, tensors)
    }

    /// Builds the graph from a JSON description and its weights
    pub fn from_parts(json: &str, tensors: HashMap<String, Tensor>) -> Result<Self> {
        let model: ModelJson = serde_json::from_str(json)?;
        let first = model
            .config
            .layers
            .first()
            .ok_or_else(|| RetinaError::ArtifactError("layer graph has no layers".to_string()))?;
        let input_shape = match first.input_shape().as_deref() {
            Some([_, Some(h), Some(w), Some(c)]) => (*h, *w, *c),
            other => {
                return Err(RetinaError::ArtifactError(format!(
                    "expected a (batch, height, width, channels) input shape, got {:?}",
                    other
                )))
            }
        };

        let mut store = WeightStore { tensors };
        let mut layers = Vec::with_capacity(model.config.layers.len());
        for spec in &model.config.layers {
            if let Some(layer) = build_layer(spec, &mut store)? {
                layers.push(layer);
            }
        }
        if !store.tensors.is_empty() {
            let mut unused: Vec<_> = store.tensors.keys().cloned().collect();
            unused.sort();
            warn!("Unused layer graph weights: {}", unused.join(", "));
        }
        debug!("Built layer graph with {} layers, input {:?}", layers.len(), input_shape);
        Ok(Self {
            layers,
            input_shape,
        })
    }

    /// Expected `(height, width, channels)` of one input image
    pub fn input_shape(&self) -> (usize, usize, usize) {
        self.input_shape
    }

    pub fn input_channels(&self) -> usize {
        self.input_shape.2
    }

    /// Runs the graph on an NHWC batch
    pub fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = xs.permute((0, 3, 1, 2))?.contiguous()?;
        for layer in &self.layers {
            xs = layer.forward(&xs)?;
        }
        if xs.rank() == 4 {
            xs = xs.permute((0, 2, 3, 1))?.contiguous()?;
        }
        Ok(xs)
    }
}

/// Weights file paired with a graph description
pub fn weights_path(config_path: &Path) -> PathBuf {
    config_path.with_extension("safetensors")
}

fn build_layer(spec: &LayerJson, store: &mut WeightStore) -> Result<Option<Layer>> {
    let name = spec.name();
    let activation = || Activation::parse(spec.str_or("activation", "linear"));
    let layer = match spec.class_name.as_str() {
        "InputLayer" | "Dropout" | "SpatialDropout2D" => return Ok(None),
        "Conv2D" => {
            let strides = spec.pair("strides").unwrap_or((1, 1));
            if strides.0 != strides.1 || spec.pair("dilation_rate").unwrap_or((1, 1)) != (1, 1) {
                return Err(RetinaError::ArtifactError(format!(
                    "Conv2D '{}' uses unsupported strides or dilation",
                    name
                )));
            }
            // stored as (kh, kw, in, out)
            let kernel = store.take(name, "kernel")?.permute((3, 2, 0, 1))?.contiguous()?;
            Layer::Conv2D {
                kernel,
                bias: store.take_if(spec.bool_or("use_bias", true), name, "bias")?,
                stride: strides.0,
                padding: Padding::parse(spec.str_or("padding", "valid"))?,
                activation: activation()?,
            }
        }
        "MaxPooling2D" => {
            let pool = spec.pair("pool_size").unwrap_or((2, 2));
            Layer::MaxPool {
                pool,
                strides: spec.pair("strides").unwrap_or(pool),
                padding: Padding::parse(spec.str_or("padding", "valid"))?,
            }
        }
        "AveragePooling2D" => {
            if Padding::parse(spec.str_or("padding", "valid"))? != Padding::Valid {
                return Err(RetinaError::ArtifactError(format!(
                    "AveragePooling2D '{}' only supports valid padding",
                    name
                )));
            }
            let pool = spec.pair("pool_size").unwrap_or((2, 2));
            Layer::AvgPool {
                pool,
                strides: spec.pair("strides").unwrap_or(pool),
            }
        }
        "GlobalAveragePooling2D" => Layer::GlobalAvgPool,
        "GlobalMaxPooling2D" => Layer::GlobalMaxPool,
        "Flatten" => Layer::Flatten,
        "Dense" => Layer::Dense {
            kernel: store.take(name, "kernel")?,
            bias: store.take_if(spec.bool_or("use_bias", true), name, "bias")?,
            activation: activation()?,
        },
        "BatchNormalization" => {
            let eps = spec.f64_or("epsilon", 1e-3);
            let mean = store.take(name, "moving_mean")?;
            let var = store.take(name, "moving_variance")?;
            let inv_std = (var + eps)?.sqrt()?.recip()?;
            let scale = match store.take_if(spec.bool_or("scale", true), name, "gamma")? {
                Some(gamma) => (gamma * &inv_std)?,
                None => inv_std,
            };
            let shift = (mean.neg()? * &scale)?;
            let shift = match store.take_if(spec.bool_or("center", true), name, "beta")? {
                Some(beta) => (shift + beta)?,
                None => shift,
            };
            Layer::BatchNorm { scale, shift }
        }
        "Activation" => Layer::Activation(activation()?),
        "ReLU" => Layer::Activation(Activation::Relu),
        "Softmax" => Layer::Activation(Activation::Softmax),
        "Rescaling" => Layer::Rescaling {
            scale: spec.f64_or("scale", 1.0),
            offset: spec.f64_or("offset", 0.0),
        },
        other => {
            return Err(RetinaError::ArtifactError(format!(
                "unsupported layer type '{}' ('{}')",
                other, name
            )))
        }
    };
    Ok(Some(layer))
}
