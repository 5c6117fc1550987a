use crate::error::{Result, RetinaError};
use crate::preprocessing::Recipe;
use crate::types::TensorLayout;
use ndarray::{Array4, ArrayView4};

/// Model-ready float32 input batch of a single image
///
/// The shape is `1 × C × H × W` or `1 × H × W × C` depending on
/// [`TensorLayout`]; normalization has already been applied by the recipe
/// that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedBatch {
    tensor: Array4<f32>,
    layout: TensorLayout,
    recipe: Option<Recipe>,
}

impl PreprocessedBatch {
    /// Wraps a tensor produced outside the recipe set
    ///
    /// # Errors
    ///
    /// Returns [`RetinaError::UnsupportedShape`] if the batch size is not 1
    pub fn new(tensor: Array4<f32>, layout: TensorLayout) -> Result<Self> {
        if tensor.dim().0 != 1 {
            return Err(RetinaError::UnsupportedShape(format!(
                "expected a batch of one image, got {}",
                tensor.dim().0
            )));
        }
        Ok(Self {
            tensor,
            layout,
            recipe: None,
        })
    }

    pub(crate) fn from_recipe(tensor: Array4<f32>, recipe: Recipe) -> Self {
        Self {
            tensor,
            layout: recipe.layout(),
            recipe: Some(recipe),
        }
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Recipe that produced this batch, if any
    pub fn recipe(&self) -> Option<Recipe> {
        self.recipe
    }

    pub fn channels(&self) -> usize {
        self.tensor.shape()[self.layout.channel_axis()]
    }

    /// Spatial size as (height, width)
    pub fn spatial(&self) -> (usize, usize) {
        let s = self.tensor.shape();
        match self.layout {
            TensorLayout::Nchw => (s[2], s[3]),
            TensorLayout::Nhwc => (s[1], s[2]),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    pub fn tensor(&self) -> ArrayView4<'_, f32> {
        self.tensor.view()
    }

    pub fn into_tensor(self) -> Array4<f32> {
        self.tensor
    }
}
