use burn::tensor::{backend::Backend, Tensor};
use image::Rgb32FImage;

use crate::figure::{FigureError, FigureResult, PlotSurface};
use crate::normalize::Normalization;

/// Convert a normalised CHW tensor into a displayable channel-last image in [0, 1].
pub fn chw_to_display<B: Backend>(
    image: Tensor<B, 3>,
    norm: &Normalization,
) -> FigureResult<Rgb32FImage> {
    let [channels, height, width] = image.dims();
    if channels != 3 {
        return Err(FigureError::Shape(format!(
            "expected a 3-channel image, got {channels} channels"
        )));
    }
    let data = image
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| FigureError::TensorData(format!("{e:?}")))?;
    norm.denormalize_chw_to_hwc(&data, width as u32, height as u32)
}

/// Undo the fixed normalisation of a CHW tensor and draw it into the surface's current cell.
pub fn view_grid<B, P>(surface: &mut P, image: Tensor<B, 3>, title: Option<&str>) -> FigureResult<()>
where
    B: Backend,
    P: PlotSurface + ?Sized,
{
    let display = chw_to_display(image, &Normalization::default())?;
    surface.draw_image(&display, title)
}
