use image::Rgb32FImage;

use crate::figure::{FigureError, FigureResult};

/// Per-channel mean used by both preprocessing pipelines.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation used by both preprocessing pipelines.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fixed per-channel affine normalisation: `(x - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl Normalization {
    pub fn normalize(&self, channel: usize, value: f32) -> f32 {
        (value - self.mean[channel]) / self.std[channel]
    }

    pub fn denormalize(&self, channel: usize, value: f32) -> f32 {
        self.std[channel] * value + self.mean[channel]
    }

    /// Normalise a CHW buffer in place. `plane` is `width * height`.
    pub fn normalize_chw_in_place(&self, data: &mut [f32], plane: usize) {
        for (c, chunk) in data.chunks_mut(plane).take(3).enumerate() {
            for v in chunk.iter_mut() {
                *v = self.normalize(c, *v);
            }
        }
    }

    /// Reverse normalisation of a 3-channel CHW buffer into a channel-last image clipped to [0, 1].
    pub fn denormalize_chw_to_hwc(
        &self,
        chw: &[f32],
        width: u32,
        height: u32,
    ) -> FigureResult<Rgb32FImage> {
        let plane = (width * height) as usize;
        if chw.len() != plane * 3 {
            return Err(FigureError::Shape(format!(
                "expected {} values for a 3x{}x{} image, got {}",
                plane * 3,
                height,
                width,
                chw.len()
            )));
        }
        let mut hwc = Vec::with_capacity(plane * 3);
        for idx in 0..plane {
            for c in 0..3 {
                let v = self.denormalize(c, chw[c * plane + idx]);
                hwc.push(v.clamp(0.0, 1.0));
            }
        }
        Rgb32FImage::from_raw(width, height, hwc)
            .ok_or_else(|| FigureError::Shape("image buffer size mismatch".to_string()))
    }
}
