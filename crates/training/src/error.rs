use image_dataset::{DatasetError, Split};
use thiserror::Error;
use vision_core::FigureError;

pub type TrainResult<T> = Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Figure(#[from] FigureError),
    #[error("{split} split has size 0; cannot compute epoch statistics")]
    EmptySplit { split: Split },
    #[error("need {requested} misclassified examples to sample without replacement, found {available}")]
    InsufficientSamples { available: usize, requested: usize },
    #[error("class id {id} has no display name ({classes} names given)")]
    UnknownClass { id: usize, classes: usize },
    #[error("tensor data error: {0}")]
    TensorData(String),
}
