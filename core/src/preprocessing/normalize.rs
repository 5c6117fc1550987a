use crate::types::TensorLayout;
use image::{GrayImage, RgbImage};
use ndarray::Array4;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel affine normalization `x * alpha + beta`
///
/// `alpha = scale / std` and `beta = -mean / std`, so the result equals
/// `(x * scale - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    alpha: [f32; 3],
    beta: [f32; 3],
}

impl Normalization {
    pub fn new(scale: f32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            alpha: [scale / std[0], scale / std[1], scale / std[2]],
            beta: [-mean[0] / std[0], -mean[1] / std[1], -mean[2] / std[2]],
        }
    }

    /// Scales 8-bit values into [0, 1]
    pub fn unit() -> Self {
        Self::new(1.0 / 255.0, [0.0; 3], [1.0; 3])
    }

    /// ImageNet mean/std after scaling to [0, 1]
    pub fn imagenet() -> Self {
        Self::new(1.0 / 255.0, IMAGENET_MEAN, IMAGENET_STD)
    }

    #[inline]
    fn apply(&self, value: u8, channel: usize) -> f32 {
        f32::from(value) * self.alpha[channel] + self.beta[channel]
    }

    /// Normalizes an RGB raster into a single-image batch
    pub fn rgb_batch(&self, img: &RgbImage, layout: TensorLayout) -> Array4<f32> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let shape = layout.batch_shape(h, w, 3);
        let mut out = Array4::<f32>::zeros(shape);
        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let v = self.apply(pixel[c], c);
                match layout {
                    TensorLayout::Nchw => out[[0, c, y, x]] = v,
                    TensorLayout::Nhwc => out[[0, y, x, c]] = v,
                }
            }
        }
        out
    }

    /// Normalizes a grayscale raster into a single-channel batch (channel 0 constants)
    pub fn gray_batch(&self, img: &GrayImage, layout: TensorLayout) -> Array4<f32> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let mut out = Array4::<f32>::zeros(layout.batch_shape(h, w, 1));
        for (x, y, pixel) in img.enumerate_pixels() {
            let v = self.apply(pixel[0], 0);
            let (x, y) = (x as usize, y as usize);
            match layout {
                TensorLayout::Nchw => out[[0, 0, y, x]] = v,
                TensorLayout::Nhwc => out[[0, y, x, 0]] = v,
            }
        }
        out
    }
}
