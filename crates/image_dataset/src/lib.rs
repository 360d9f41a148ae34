//! Image-folder datasets, preprocessing pipelines and batch loaders for classification.
//!
//! This crate provides:
//! - The named "train" / "val" preprocessing pipelines
//! - Image-folder scanning (one sub-directory per class)
//! - Re-iterable batch loaders yielding host-side batches that move onto a burn device

pub mod batch;
pub mod folder;
pub mod transforms;
pub mod types;

pub use batch::{prepare_data, BatchLoader, FolderLoader, InMemoryLoader, LoaderConfig, PreparedData};
pub use folder::{image_datasets, ImageFolder, ImageSample};
pub use transforms::{data_transforms, TransformPipeline, TransformStep};
pub use types::*;
