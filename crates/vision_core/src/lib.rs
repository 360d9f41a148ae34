//! vision_core: normalisation constants, plotting surfaces and the image display helper.

pub mod display;
pub mod figure;
pub mod normalize;

pub use display::{chw_to_display, view_grid};
pub use figure::{Figure, FigureError, FigureResult, GridLayout, PlotSurface};
pub use normalize::{Normalization, IMAGENET_MEAN, IMAGENET_STD};

pub mod prelude {
    pub use crate::display::*;
    pub use crate::figure::*;
    pub use crate::normalize::*;
}
