use crate::error::{Result, RetinaError};
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array3, ArrayView3, Axis};
use serde::Serialize;
use std::fmt;

/// Container format an image was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// PNG, JPEG and other raster formats
    StandardImage,
    /// DICOM file or stream
    Dicom,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::StandardImage => write!(f, "image"),
            SourceFormat::Dicom => write!(f, "dicom"),
        }
    }
}

/// Decoded 8-bit pixel grid shared by every input format
///
/// Pixels are stored height × width × channels with 1, 3 or 4 channels.
/// `bit_depth` records the sample depth of the source before any
/// rescaling to 8 bits.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalImage {
    pixels: Array3<u8>,
    bit_depth: u16,
    source: SourceFormat,
}

impl CanonicalImage {
    /// Creates a canonical image, rejecting unsupported channel counts
    ///
    /// # Errors
    ///
    /// Returns [`RetinaError::UnsupportedShape`] if the channel count is not 1, 3 or 4
    /// or the grid is empty
    pub fn new(pixels: Array3<u8>, bit_depth: u16, source: SourceFormat) -> Result<Self> {
        let (height, width, channels) = pixels.dim();
        if !matches!(channels, 1 | 3 | 4) {
            return Err(RetinaError::UnsupportedShape(format!(
                "canonical image must have 1, 3 or 4 channels, got {}",
                channels
            )));
        }
        if height == 0 || width == 0 {
            return Err(RetinaError::UnsupportedShape(format!(
                "empty pixel grid {}x{}",
                height, width
            )));
        }
        Ok(Self {
            pixels,
            bit_depth,
            source,
        })
    }

    /// Converts a decoded raster image, keeping gray, RGB or RGBA channels
    pub fn from_dynamic(image: DynamicImage, source: SourceFormat) -> Result<Self> {
        let color = image.color();
        let bit_depth = color.bits_per_pixel() / u16::from(color.channel_count());
        let (width, height) = (image.width() as usize, image.height() as usize);
        // Gray with alpha collapses to gray
        let channels = match color.channel_count() {
            1 | 2 => 1,
            4 => 4,
            _ => 3,
        };
        let raw = match channels {
            1 => image.to_luma8().into_raw(),
            4 => image.to_rgba8().into_raw(),
            _ => image.to_rgb8().into_raw(),
        };
        let pixels = Array3::from_shape_vec((height, width, channels), raw)?;
        Self::new(pixels, bit_depth, source)
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn source(&self) -> SourceFormat {
        self.source
    }

    /// Borrows the pixel grid (height × width × channels)
    pub fn pixels(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    /// Returns an RGB raster, replicating gray and dropping alpha
    pub fn to_rgb_image(&self) -> RgbImage {
        let (height, width, channels) = self.pixels.dim();
        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            if channels == 1 {
                let v = self.pixels[[y, x, 0]];
                image::Rgb([v, v, v])
            } else {
                image::Rgb([
                    self.pixels[[y, x, 0]],
                    self.pixels[[y, x, 1]],
                    self.pixels[[y, x, 2]],
                ])
            }
        })
    }

    /// Returns a single-channel raster using ITU-R 601-2 luma weights
    pub fn to_luma_image(&self) -> GrayImage {
        if self.channels() == 1 {
            let (height, width, _) = self.pixels.dim();
            let raw: Vec<u8> = self.pixels.index_axis(Axis(2), 0).iter().copied().collect();
            if let Some(img) = GrayImage::from_raw(width as u32, height as u32, raw) {
                return img;
            }
        }
        DynamicImage::ImageRgb8(self.to_rgb_image()).to_luma8()
    }

    /// Encodes the image as PNG
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut out = std::io::Cursor::new(Vec::new());
        let dynamic = match self.channels() {
            1 => DynamicImage::ImageLuma8(self.to_luma_image()),
            _ => DynamicImage::ImageRgb8(self.to_rgb_image()),
        };
        dynamic.write_to(&mut out, image::ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_two_channels() {
        let pixels = Array3::<u8>::zeros((4, 4, 2));
        assert!(CanonicalImage::new(pixels, 8, SourceFormat::Dicom).is_err());
    }

    #[test]
    fn test_rejects_empty_grid() {
        let pixels = Array3::<u8>::zeros((0, 4, 3));
        assert!(CanonicalImage::new(pixels, 8, SourceFormat::Dicom).is_err());
    }

    #[test]
    fn test_from_dynamic_gray() {
        let gray = GrayImage::from_pixel(7, 5, image::Luma([42]));
        let img = CanonicalImage::from_dynamic(DynamicImage::ImageLuma8(gray), SourceFormat::StandardImage)
            .unwrap();
        assert_eq!((img.height(), img.width(), img.channels()), (5, 7, 1));
        assert_eq!(img.bit_depth(), 8);
        assert_eq!(img.to_rgb_image().get_pixel(3, 2).0, [42, 42, 42]);
    }

    #[test]
    fn test_from_dynamic_rgba_keeps_alpha_channel() {
        let rgba = image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let img = CanonicalImage::from_dynamic(DynamicImage::ImageRgba8(rgba), SourceFormat::StandardImage)
            .unwrap();
        assert_eq!(img.channels(), 4);
        assert_eq!(img.to_rgb_image().get_pixel(0, 0).0, [1, 2, 3]);
    }

    #[test]
    fn test_png_export_decodes_back() {
        let pixels = Array3::from_shape_fn((6, 8, 3), |(y, x, c)| (y * 10 + x + c) as u8);
        let img = CanonicalImage::new(pixels, 8, SourceFormat::Dicom).unwrap();
        let png = img.to_png_bytes().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(2, 1).0, [12, 13, 14]);
    }
}
