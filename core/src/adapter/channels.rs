use crate::error::{Result, RetinaError};
use crate::types::{PreprocessedBatch, TensorLayout};
use ndarray::{concatenate, Array4, Axis};

/// Converts a batch to the layout and channel count a graph consumes
///
/// One channel is replicated to three and three channels are averaged to
/// one; any other mismatch is rejected.
pub fn reconcile(
    batch: &PreprocessedBatch,
    channels: usize,
    layout: TensorLayout,
) -> Result<Array4<f32>> {
    let view = match (batch.layout(), layout) {
        (TensorLayout::Nchw, TensorLayout::Nhwc) => batch.tensor().permuted_axes([0, 2, 3, 1]),
        (TensorLayout::Nhwc, TensorLayout::Nchw) => batch.tensor().permuted_axes([0, 3, 1, 2]),
        _ => batch.tensor(),
    };
    let axis = Axis(layout.channel_axis());
    let have = view.len_of(axis);
    match (have, channels) {
        (h, c) if h == c => Ok(view.as_standard_layout().into_owned()),
        (1, 3) => Ok(concatenate(axis, &[view, view, view])?),
        (3, 1) => view
            .mean_axis(axis)
            .map(|mean| mean.insert_axis(axis))
            .ok_or_else(|| RetinaError::UnsupportedShape("empty channel axis".to_string())),
        (h, c) => Err(RetinaError::UnsupportedShape(format!(
            "cannot adapt {} input channels to {}",
            h, c
        ))),
    }
}
