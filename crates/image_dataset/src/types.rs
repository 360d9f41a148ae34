//! Core types and error definitions for image_dataset.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no class directories found under {root}")]
    NoClasses { root: PathBuf },
    #[error("class lists differ between splits: train={train:?} val={val:?}")]
    ClassMismatch { train: Vec<String>, val: Vec<String> },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("transform error: {0}")]
    Transform(String),
}

/// The two phases of a training epoch, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Val];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splits<T> {
    pub train: T,
    pub val: T,
}

impl<T> Splits<T> {
    pub fn new(train: T, val: T) -> Self {
        Self { train, val }
    }

    pub fn get(&self, split: Split) -> &T {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
        }
    }

    pub fn get_mut(&mut self, split: Split) -> &mut T {
        match split {
            Split::Train => &mut self.train,
            Split::Val => &mut self.val,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Split, T) -> U) -> Splits<U> {
        Splits {
            train: f(Split::Train, self.train),
            val: f(Split::Val, self.val),
        }
    }
}

/// A host-side batch: CHW pixels for `N` images plus one class id per image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    images: Vec<f32>,
    shape: [usize; 4],
    labels: Vec<usize>,
}

impl ImageBatch {
    /// `shape` is `[N, C, H, W]`.
    pub fn new(images: Vec<f32>, shape: [usize; 4], labels: Vec<usize>) -> DatasetResult<Self> {
        let [n, c, h, w] = shape;
        if images.len() != n * c * h * w {
            return Err(DatasetError::Shape(format!(
                "batch of shape {shape:?} needs {} values, got {}",
                n * c * h * w,
                images.len()
            )));
        }
        if labels.len() != n {
            return Err(DatasetError::Shape(format!(
                "batch of {n} images has {} labels",
                labels.len()
            )));
        }
        Ok(Self {
            images,
            shape,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.shape[0] == 0
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn images(&self) -> &[f32] {
        &self.images
    }

    /// Move the batch onto `device` as `([N, C, H, W] float, [N] int)` tensors.
    pub fn to_device<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 4>, Tensor<B, 1, Int>) {
        let images =
            Tensor::<B, 4>::from_data(TensorData::new(self.images.clone(), self.shape), device);
        let labels: Vec<i64> = self.labels.iter().map(|&l| l as i64).collect();
        let labels =
            Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [self.shape[0]]), device);
        (images, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn split_order_and_names() {
        assert_eq!(Split::ALL, [Split::Train, Split::Val]);
        assert_eq!(Split::Train.to_string(), "train");
        assert_eq!(Split::Val.as_str(), "val");
    }

    #[test]
    fn splits_lookup_and_map() {
        let mut sizes = Splits::new(10usize, 4usize);
        assert_eq!(*sizes.get(Split::Val), 4);
        *sizes.get_mut(Split::Train) += 1;
        let labels = sizes.map(|split, n| format!("{split}:{n}"));
        assert_eq!(labels.train, "train:11");
        assert_eq!(labels.val, "val:4");
    }

    #[test]
    fn batch_validates_lengths() {
        assert!(ImageBatch::new(vec![0.0; 12], [1, 3, 2, 2], vec![0]).is_ok());
        assert!(ImageBatch::new(vec![0.0; 11], [1, 3, 2, 2], vec![0]).is_err());
        assert!(ImageBatch::new(vec![0.0; 12], [1, 3, 2, 2], vec![0, 1]).is_err());
    }

    #[test]
    fn batch_moves_to_device() {
        let batch = ImageBatch::new(vec![0.5; 24], [2, 3, 2, 2], vec![1, 0]).unwrap();
        let device = Default::default();
        let (images, labels) = batch.to_device::<NdArray<f32>>(&device);
        assert_eq!(images.dims(), [2, 3, 2, 2]);
        let labels = labels.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![1, 0]);
    }
}
