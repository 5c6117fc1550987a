//! Network graphs behind the model families

mod layer_graph;
mod mobilenet;
mod resnet;
mod standin;
mod vit;

pub use layer_graph::{weights_path, Activation, LayerGraph};
pub use mobilenet::{MobileNetV3Regressor, FEATURE_DIM, HIDDEN_DIM};
pub use resnet::{ResNet, ResNetConfig};
pub use standin::StandIn;
pub use vit::{VisionTransformer, VitConfig};

use crate::error::Result;
use candle_core::{Device, Tensor};
use ndarray::ArrayView4;

/// Any graph an adapter can run
#[derive(Debug)]
pub enum Graph {
    ResNet(ResNet),
    Vit(VisionTransformer),
    MobileNet(MobileNetV3Regressor),
    Layers(LayerGraph),
    StandIn(StandIn),
}

impl Graph {
    pub fn kind(&self) -> &'static str {
        match self {
            Graph::ResNet(_) => "resnet",
            Graph::Vit(_) => "vit",
            Graph::MobileNet(_) => "mobilenet_v3_large",
            Graph::Layers(_) => "layer_graph",
            Graph::StandIn(_) => "stand_in",
        }
    }

    /// Channel count the graph consumes
    pub fn input_channels(&self) -> usize {
        match self {
            Graph::Layers(g) => g.input_channels(),
            Graph::StandIn(s) => s.input_channels(),
            Graph::ResNet(_) | Graph::Vit(_) | Graph::MobileNet(_) => 3,
        }
    }

    /// Runs the graph, returning a `(batch, outputs)` tensor
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let out = match self {
            Graph::ResNet(g) => g.forward(xs)?,
            Graph::Vit(g) => g.forward(xs)?,
            Graph::MobileNet(g) => g.forward(xs)?,
            Graph::Layers(g) => g.forward(xs)?,
            Graph::StandIn(g) => g.forward(xs)?,
        };
        Ok(out)
    }
}

/// Copies an ndarray batch into a tensor on `device`
pub fn to_tensor(batch: ArrayView4<'_, f32>, device: &Device) -> Result<Tensor> {
    let shape = batch.shape().to_vec();
    let values: Vec<f32> = batch.iter().copied().collect();
    Ok(Tensor::from_vec(values, shape, device)?)
}
