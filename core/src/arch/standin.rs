use candle_core::{Result, Tensor};

/// Constant computation substituted for a graph that could not be loaded
///
/// It checks the channel count like the real graph would and emits `width`
/// copies of `value` per batch item.
#[derive(Debug, Clone, PartialEq)]
pub struct StandIn {
    channels: usize,
    channel_axis: usize,
    width: usize,
    value: f32,
}

impl StandIn {
    /// Neutral classifier: all-zero logits
    pub fn zeros(channels: usize, channel_axis: usize, width: usize) -> Self {
        Self::constant(channels, channel_axis, width, 0.0)
    }

    pub fn constant(channels: usize, channel_axis: usize, width: usize, value: f32) -> Self {
        Self {
            channels,
            channel_axis,
            width,
            value,
        }
    }

    pub fn input_channels(&self) -> usize {
        self.channels
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let dims = xs.dims4()?;
        let channels = [dims.0, dims.1, dims.2, dims.3][self.channel_axis];
        if channels != self.channels {
            candle_core::bail!(
                "stand-in expects {} input channels, got {}",
                self.channels,
                channels
            );
        }
        Tensor::full(self.value, (dims.0, self.width), xs.device())
    }
}
