//! Preprocessing recipes
//!
//! A [`Recipe`] is a fixed combination of target size, channel mode,
//! normalization and tensor layout. Every model family consumes exactly
//! one recipe; recipes are pure functions of the canonical image.

mod normalize;

pub use normalize::{Normalization, IMAGENET_MEAN, IMAGENET_STD};

use crate::decoder;
use crate::error::{Result, RetinaError};
use crate::types::{CanonicalImage, PreprocessedBatch, SourceFormat, TensorLayout};
use image::imageops::{self, FilterType};
use ndarray::Array3;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Interpolation used by every recipe (bilinear)
const FILTER: FilterType = FilterType::Triangle;

/// Channel mode of a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Gray,
    Rgb,
}

/// Named preprocessing recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recipe {
    OctGray256,
    OctRgb224,
    FundusAmd256,
    FundusRgb224,
    Biomarker540,
    OctRgb224Nhwc,
    FundusRgb256Nhwc,
}

impl Recipe {
    pub const ALL: [Recipe; 7] = [
        Recipe::OctGray256,
        Recipe::OctRgb224,
        Recipe::FundusAmd256,
        Recipe::FundusRgb224,
        Recipe::Biomarker540,
        Recipe::OctRgb224Nhwc,
        Recipe::FundusRgb256Nhwc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Recipe::OctGray256 => "oct-gray-256",
            Recipe::OctRgb224 => "oct-rgb-224",
            Recipe::FundusAmd256 => "fundus-amd-256",
            Recipe::FundusRgb224 => "fundus-rgb-224",
            Recipe::Biomarker540 => "biomarker-540",
            Recipe::OctRgb224Nhwc => "oct-rgb-224-nhwc",
            Recipe::FundusRgb256Nhwc => "fundus-rgb-256-nhwc",
        }
    }

    /// Square output size in pixels
    pub fn size(&self) -> u32 {
        match self {
            Recipe::OctRgb224 | Recipe::FundusRgb224 | Recipe::OctRgb224Nhwc => 224,
            Recipe::OctGray256 | Recipe::FundusAmd256 | Recipe::FundusRgb256Nhwc => 256,
            Recipe::Biomarker540 => 540,
        }
    }

    pub fn channel_mode(&self) -> ChannelMode {
        match self {
            Recipe::OctGray256 => ChannelMode::Gray,
            _ => ChannelMode::Rgb,
        }
    }

    pub fn channels(&self) -> usize {
        match self.channel_mode() {
            ChannelMode::Gray => 1,
            ChannelMode::Rgb => 3,
        }
    }

    pub fn layout(&self) -> TensorLayout {
        match self {
            Recipe::OctRgb224Nhwc | Recipe::FundusRgb256Nhwc => TensorLayout::Nhwc,
            _ => TensorLayout::Nchw,
        }
    }

    pub fn normalization(&self) -> Normalization {
        match self {
            Recipe::OctGray256 | Recipe::OctRgb224Nhwc | Recipe::FundusRgb256Nhwc => {
                Normalization::unit()
            }
            _ => Normalization::imagenet(),
        }
    }

    /// Shape of the batch this recipe produces
    pub fn output_shape(&self) -> [usize; 4] {
        let size = self.size() as usize;
        self.layout().batch_shape(size, size, self.channels())
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Recipe {
    type Err = RetinaError;

    fn from_str(s: &str) -> Result<Self> {
        Recipe::ALL
            .iter()
            .find(|r| r.name() == s)
            .copied()
            .ok_or_else(|| RetinaError::UnknownRecipe(s.to_string()))
    }
}

/// Anything a recipe can be applied to
#[derive(Debug)]
pub enum PreprocessInput<'a> {
    Image(&'a CanonicalImage),
    Path(&'a Path),
    Bytes(&'a [u8]),
    /// Raw height × width × channels pixel grid
    Pixels(Array3<u8>),
}

impl<'a> From<&'a CanonicalImage> for PreprocessInput<'a> {
    fn from(image: &'a CanonicalImage) -> Self {
        PreprocessInput::Image(image)
    }
}

impl<'a> From<&'a Path> for PreprocessInput<'a> {
    fn from(path: &'a Path) -> Self {
        PreprocessInput::Path(path)
    }
}

/// Applies a recipe to a canonical image
///
/// Output is deterministic: the same image and recipe always produce the
/// same batch.
pub fn preprocess(image: &CanonicalImage, recipe: Recipe) -> PreprocessedBatch {
    let size = recipe.size();
    let norm = recipe.normalization();
    let tensor = match recipe.channel_mode() {
        ChannelMode::Rgb => {
            let resized = imageops::resize(&image.to_rgb_image(), size, size, FILTER);
            norm.rgb_batch(&resized, recipe.layout())
        }
        ChannelMode::Gray => {
            let resized = imageops::resize(&image.to_luma_image(), size, size, FILTER);
            norm.gray_batch(&resized, recipe.layout())
        }
    };
    PreprocessedBatch::from_recipe(tensor, recipe)
}

/// Applies a recipe selected by name
///
/// # Errors
///
/// Returns [`RetinaError::UnknownRecipe`] for names outside the fixed set
pub fn preprocess_named(image: &CanonicalImage, recipe: &str) -> Result<PreprocessedBatch> {
    Ok(preprocess(image, recipe.parse()?))
}

/// Applies a recipe to a path, byte buffer, pixel grid or decoded image
///
/// # Errors
///
/// Returns [`RetinaError::UnsupportedInput`] for pixel grids whose channel
/// count is not 1, 3 or 4, and decode errors for unreadable files
pub fn preprocess_input(input: PreprocessInput<'_>, recipe: Recipe) -> Result<PreprocessedBatch> {
    match input {
        PreprocessInput::Image(image) => Ok(preprocess(image, recipe)),
        PreprocessInput::Path(path) => Ok(preprocess(&decoder::decode(path)?, recipe)),
        PreprocessInput::Bytes(bytes) => Ok(preprocess(&decoder::decode_bytes(bytes)?, recipe)),
        PreprocessInput::Pixels(pixels) => {
            let channels = pixels.dim().2;
            let image = CanonicalImage::new(pixels, 8, SourceFormat::StandardImage).map_err(|_| {
                RetinaError::UnsupportedInput(format!(
                    "pixel grid with {} channels cannot be preprocessed",
                    channels
                ))
            })?;
            Ok(preprocess(&image, recipe))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn gradient(height: usize, width: usize) -> CanonicalImage {
        let pixels = Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
            ((x * 7 + y * 3 + c * 50) % 256) as u8
        });
        CanonicalImage::new(pixels, 8, SourceFormat::StandardImage).unwrap()
    }

    #[rstest]
    #[case(Recipe::OctGray256, [1, 1, 256, 256])]
    #[case(Recipe::OctRgb224, [1, 3, 224, 224])]
    #[case(Recipe::FundusAmd256, [1, 3, 256, 256])]
    #[case(Recipe::FundusRgb224, [1, 3, 224, 224])]
    #[case(Recipe::Biomarker540, [1, 3, 540, 540])]
    #[case(Recipe::OctRgb224Nhwc, [1, 224, 224, 3])]
    #[case(Recipe::FundusRgb256Nhwc, [1, 256, 256, 3])]
    fn test_recipe_output_shape(#[case] recipe: Recipe, #[case] shape: [usize; 4]) {
        let batch = preprocess(&gradient(37, 53), recipe);
        assert_eq!(batch.shape(), &shape);
        assert_eq!(recipe.output_shape(), shape);
        assert_eq!(batch.recipe(), Some(recipe));
    }

    #[test]
    fn test_recipe_names_round_trip() {
        for recipe in Recipe::ALL {
            assert_eq!(recipe.name().parse::<Recipe>().unwrap(), recipe);
        }
        assert!(matches!(
            "oct-rgb-512".parse::<Recipe>(),
            Err(RetinaError::UnknownRecipe(_))
        ));
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let image = gradient(64, 48);
        assert_eq!(
            preprocess(&image, Recipe::FundusAmd256),
            preprocess(&image, Recipe::FundusAmd256)
        );
    }

    #[test]
    fn test_unit_recipes_stay_in_range() {
        let batch = preprocess(&gradient(30, 30), Recipe::OctRgb224Nhwc);
        assert!(batch.tensor().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_constant_image_normalizes_to_imagenet_offsets() {
        let pixels = Array3::from_elem((10, 10, 3), 255u8);
        let image = CanonicalImage::new(pixels, 8, SourceFormat::Dicom).unwrap();
        let batch = preprocess(&image, Recipe::FundusRgb224);
        let expected = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((batch.tensor()[[0, 0, 100, 100]] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_pixels_with_two_channels_rejected() {
        let result = preprocess_input(PreprocessInput::Pixels(Array3::zeros((8, 8, 2))), Recipe::OctRgb224);
        assert!(matches!(result, Err(RetinaError::UnsupportedInput(_))));
    }

    #[test]
    fn test_gray_pixels_accepted() {
        let batch = preprocess_input(
            PreprocessInput::Pixels(Array3::from_elem((8, 8, 1), 128u8)),
            Recipe::OctGray256,
        )
        .unwrap();
        assert_eq!(batch.channels(), 1);
    }

    #[test]
    fn test_named_preprocess() {
        let batch = preprocess_named(&gradient(5, 5), "biomarker-540").unwrap();
        assert_eq!(batch.spatial(), (540, 540));
        assert!(preprocess_named(&gradient(5, 5), "nope").is_err());
    }
}
