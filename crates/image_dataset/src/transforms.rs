//! The named preprocessing pipelines and the image operations behind them.

use crate::types::{DatasetError, DatasetResult, Splits};
use image::imageops::FilterType;
use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use vision_core::Normalization;

pub const CROP_SIZE: u32 = 224;
pub const RESIZE_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformStep {
    /// Crop a random area/aspect region, then resize it to `size` x `size`.
    RandomResizedCrop {
        size: u32,
        scale: (f32, f32),
        ratio: (f32, f32),
    },
    RandomHorizontalFlip { p: f32 },
    /// Resize so the shorter side equals `size`, keeping aspect ratio.
    Resize { size: u32 },
    CenterCrop { size: u32 },
    /// HWC u8 pixels to CHW floats in [0, 1].
    ToTensor,
    Normalize(Normalization),
}

impl TransformStep {
    pub fn random_resized_crop(size: u32) -> Self {
        TransformStep::RandomResizedCrop {
            size,
            scale: (0.08, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransformStep::RandomResizedCrop { .. } => "RandomResizedCrop",
            TransformStep::RandomHorizontalFlip { .. } => "RandomHorizontalFlip",
            TransformStep::Resize { .. } => "Resize",
            TransformStep::CenterCrop { .. } => "CenterCrop",
            TransformStep::ToTensor => "ToTensor",
            TransformStep::Normalize(_) => "Normalize",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TransformStep::RandomResizedCrop { size, scale, ratio } => format!(
                "RandomResizedCrop({size}, scale=[{:.2},{:.2}], ratio=[{:.2},{:.2}])",
                scale.0, scale.1, ratio.0, ratio.1
            ),
            TransformStep::RandomHorizontalFlip { p } => format!("RandomHorizontalFlip(p={p:.2})"),
            TransformStep::Resize { size } => format!("Resize({size})"),
            TransformStep::CenterCrop { size } => format!("CenterCrop({size})"),
            TransformStep::ToTensor => "ToTensor".to_string(),
            TransformStep::Normalize(n) => format!("Normalize(mean={:?}, std={:?})", n.mean, n.std),
        }
    }
}

/// A normalised CHW image produced by a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedImage {
    pub chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

enum Stage {
    Pixels(RgbImage),
    Tensor {
        data: Vec<f32>,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformPipeline {
    pub steps: Vec<TransformStep>,
}

impl TransformPipeline {
    pub fn new(steps: Vec<TransformStep>) -> Self {
        Self { steps }
    }

    /// Training pipeline: random crop + flip augmentation.
    pub fn train() -> Self {
        Self::new(vec![
            TransformStep::random_resized_crop(CROP_SIZE),
            TransformStep::RandomHorizontalFlip { p: 0.5 },
            TransformStep::ToTensor,
            TransformStep::Normalize(Normalization::default()),
        ])
    }

    /// Validation pipeline: deterministic resize + centre crop.
    pub fn val() -> Self {
        Self::new(vec![
            TransformStep::Resize { size: RESIZE_SIZE },
            TransformStep::CenterCrop { size: CROP_SIZE },
            TransformStep::ToTensor,
            TransformStep::Normalize(Normalization::default()),
        ])
    }

    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(TransformStep::describe)
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn apply(
        &self,
        img: RgbImage,
        rng: &mut dyn rand::RngCore,
    ) -> DatasetResult<TransformedImage> {
        let mut stage = Stage::Pixels(img);
        for step in &self.steps {
            stage = match (step, stage) {
                (TransformStep::RandomResizedCrop { size, scale, ratio }, Stage::Pixels(img)) => {
                    Stage::Pixels(random_resized_crop(&img, *size, *scale, *ratio, rng))
                }
                (TransformStep::RandomHorizontalFlip { p }, Stage::Pixels(mut img)) => {
                    maybe_hflip(&mut img, *p, rng);
                    Stage::Pixels(img)
                }
                (TransformStep::Resize { size }, Stage::Pixels(img)) => {
                    Stage::Pixels(resize_shorter_side(&img, *size))
                }
                (TransformStep::CenterCrop { size }, Stage::Pixels(img)) => {
                    Stage::Pixels(center_crop(&img, *size))
                }
                (TransformStep::ToTensor, Stage::Pixels(img)) => {
                    let (width, height) = img.dimensions();
                    Stage::Tensor {
                        data: to_chw(&img),
                        width,
                        height,
                    }
                }
                (
                    TransformStep::Normalize(norm),
                    Stage::Tensor {
                        mut data,
                        width,
                        height,
                    },
                ) => {
                    norm.normalize_chw_in_place(&mut data, (width * height) as usize);
                    Stage::Tensor {
                        data,
                        width,
                        height,
                    }
                }
                (TransformStep::Normalize(_), Stage::Pixels(_)) => {
                    return Err(DatasetError::Transform(
                        "Normalize must come after ToTensor".to_string(),
                    ));
                }
                (step, Stage::Tensor { .. }) => {
                    return Err(DatasetError::Transform(format!(
                        "{} expects pixels but the image was already converted by ToTensor",
                        step.name()
                    )));
                }
            };
        }
        match stage {
            Stage::Tensor {
                data,
                width,
                height,
            } => Ok(TransformedImage {
                chw: data,
                width,
                height,
            }),
            Stage::Pixels(_) => Err(DatasetError::Transform(
                "pipeline never converts the image with ToTensor".to_string(),
            )),
        }
    }
}

/// The "train" and "val" preprocessing pipelines.
pub fn data_transforms() -> Splits<TransformPipeline> {
    Splits::new(TransformPipeline::train(), TransformPipeline::val())
}

/// Crop window `(left, top, width, height)` for a random resized crop.
pub(crate) fn random_resized_crop_window(
    width: u32,
    height: u32,
    scale: (f32, f32),
    ratio: (f32, f32),
    rng: &mut dyn rand::RngCore,
) -> (u32, u32, u32, u32) {
    let area = (width * height) as f32;
    let log_ratio = (ratio.0.ln(), ratio.1.ln());
    for _ in 0..10 {
        let target_area = area * rng.random_range(scale.0..=scale.1);
        let aspect = rng.random_range(log_ratio.0..=log_ratio.1).exp();
        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;
        if w > 0 && w <= width && h > 0 && h <= height {
            let top = rng.random_range(0..=height - h);
            let left = rng.random_range(0..=width - w);
            return (left, top, w, h);
        }
    }

    // Fallback: centre crop with the aspect ratio clamped into range.
    let in_ratio = width as f32 / height as f32;
    let (w, h) = if in_ratio < ratio.0 {
        (width, ((width as f32 / ratio.0).round() as u32).clamp(1, height))
    } else if in_ratio > ratio.1 {
        (((height as f32 * ratio.1).round() as u32).clamp(1, width), height)
    } else {
        (width, height)
    };
    ((width - w) / 2, (height - h) / 2, w, h)
}

fn random_resized_crop(
    img: &RgbImage,
    size: u32,
    scale: (f32, f32),
    ratio: (f32, f32),
    rng: &mut dyn rand::RngCore,
) -> RgbImage {
    let (width, height) = img.dimensions();
    let (left, top, w, h) = random_resized_crop_window(width, height, scale, ratio, rng);
    let cropped = image::imageops::crop_imm(img, left, top, w, h).to_image();
    image::imageops::resize(&cropped, size, size, FilterType::Triangle)
}

pub(crate) fn maybe_hflip(img: &mut RgbImage, prob: f32, rng: &mut dyn rand::RngCore) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(img);
    }
}

pub(crate) fn resize_shorter_side(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if (w <= h && w == size) || (h <= w && h == size) {
        return img.clone();
    }
    let (new_w, new_h) = if w <= h {
        (size, ((size as u64 * h as u64) / w as u64) as u32)
    } else {
        (((size as u64 * w as u64) / h as u64) as u32, size)
    };
    image::imageops::resize(img, new_w.max(1), new_h.max(1), FilterType::Triangle)
}

/// Centre crop to `size` x `size`, zero-padding images smaller than the crop.
pub(crate) fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let padded;
    let img = if w < size || h < size {
        let cw = w.max(size);
        let ch = h.max(size);
        let mut canvas = RgbImage::new(cw, ch);
        image::imageops::replace(&mut canvas, img, ((cw - w) / 2).into(), ((ch - h) / 2).into());
        padded = canvas;
        &padded
    } else {
        img
    };
    let (w, h) = img.dimensions();
    let top = ((h - size) as f32 / 2.0).round() as u32;
    let left = ((w - size) as f32 / 2.0).round() as u32;
    image::imageops::crop_imm(img, left, top, size, size).to_image()
}

fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        chw[base] = pixel[0] as f32 / 255.0;
        chw[plane + base] = pixel[1] as f32 / 255.0;
        chw[2 * plane + base] = pixel[2] as f32 / 255.0;
    }
    chw
}
