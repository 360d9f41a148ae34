//! Batch iteration for training and validation.

use crate::folder::{image_datasets, ImageFolder};
use crate::transforms::{data_transforms, TransformPipeline, TransformedImage};
use crate::types::{DatasetError, DatasetResult, ImageBatch, Splits};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::Path;

pub type BatchStream<'a> = Box<dyn Iterator<Item = DatasetResult<ImageBatch>> + 'a>;

/// A re-iterable source of batches for one split.
pub trait BatchLoader {
    /// Start a fresh pass over the split.
    fn batches(&mut self) -> BatchStream<'_>;
}

impl<L: BatchLoader + ?Sized> BatchLoader for &mut L {
    fn batches(&mut self) -> BatchStream<'_> {
        (**self).batches()
    }
}

impl<L: BatchLoader + ?Sized> BatchLoader for Box<L> {
    fn batches(&mut self) -> BatchStream<'_> {
        (**self).batches()
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Reshuffle sample order at the start of every pass.
    pub shuffle: bool,
    /// Seed for shuffling and random augmentation; None draws from the OS.
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            shuffle: true,
            seed: None,
        }
    }
}

/// Pre-built batches replayed in the same order on every pass.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    batches: Vec<ImageBatch>,
}

impl InMemoryLoader {
    pub fn new(batches: Vec<ImageBatch>) -> Self {
        Self { batches }
    }

    pub fn num_samples(&self) -> usize {
        self.batches.iter().map(ImageBatch::len).sum()
    }
}

impl BatchLoader for InMemoryLoader {
    fn batches(&mut self) -> BatchStream<'_> {
        Box::new(self.batches.iter().cloned().map(Ok))
    }
}

/// Decodes and transforms images from an [`ImageFolder`] batch by batch.
#[derive(Debug, Clone)]
pub struct FolderLoader {
    folder: ImageFolder,
    pipeline: TransformPipeline,
    batch_size: usize,
    shuffle: bool,
    seed: Option<u64>,
    epoch: u64,
}

impl FolderLoader {
    pub fn new(folder: ImageFolder, pipeline: TransformPipeline, cfg: &LoaderConfig) -> Self {
        Self {
            folder,
            pipeline,
            batch_size: cfg.batch_size.max(1),
            shuffle: cfg.shuffle,
            seed: cfg.seed,
            epoch: 0,
        }
    }

    pub fn folder(&self) -> &ImageFolder {
        &self.folder
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    pub fn len(&self) -> usize {
        self.folder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folder.is_empty()
    }

    fn order(&self, epoch: u64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.folder.len()).collect();
        if self.shuffle {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed ^ epoch),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            indices.shuffle(&mut rng);
        }
        indices
    }

    fn load_sample(&self, idx: usize, epoch: u64) -> DatasetResult<TransformedImage> {
        let sample = &self.folder.samples()[idx];
        let img = image::open(&sample.path)
            .map_err(|source| DatasetError::Image {
                path: sample.path.clone(),
                source,
            })?
            .to_rgb8();
        // Seeded per sample so parallel decoding stays reproducible.
        let mut rng_local;
        let mut seeded_rng;
        let rng: &mut dyn rand::RngCore = if let Some(seed) = self.seed {
            let mixed = seed ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ idx as u64;
            seeded_rng = StdRng::seed_from_u64(mixed);
            &mut seeded_rng
        } else {
            rng_local = rand::rng();
            &mut rng_local
        };
        self.pipeline.apply(img, rng)
    }

    fn load_chunk(&self, chunk: &[usize], epoch: u64) -> DatasetResult<ImageBatch> {
        let loaded: Vec<DatasetResult<TransformedImage>> = chunk
            .par_iter()
            .map(|&idx| self.load_sample(idx, epoch))
            .collect();

        let mut expected_size: Option<(u32, u32)> = None;
        let mut images = Vec::new();
        let mut labels = Vec::with_capacity(chunk.len());
        for (res, &idx) in loaded.into_iter().zip(chunk) {
            let sample = res?;
            let size = (sample.width, sample.height);
            match expected_size {
                None => {
                    expected_size = Some(size);
                    images.reserve(chunk.len() * sample.chw.len());
                }
                Some(sz) if sz != size => {
                    return Err(DatasetError::Shape(format!(
                        "batch contains varying image sizes ({}x{} vs {}x{}); add a crop to the pipeline",
                        sz.0, sz.1, size.0, size.1
                    )));
                }
                _ => {}
            }
            images.extend_from_slice(&sample.chw);
            labels.push(self.folder.samples()[idx].label);
        }
        let (width, height) =
            expected_size.ok_or_else(|| DatasetError::Shape("empty batch".to_string()))?;
        ImageBatch::new(
            images,
            [chunk.len(), 3, height as usize, width as usize],
            labels,
        )
    }
}

impl BatchLoader for FolderLoader {
    fn batches(&mut self) -> BatchStream<'_> {
        let epoch = self.epoch;
        self.epoch += 1;
        let order = self.order(epoch);
        let batch_size = self.batch_size;
        let n_batches = order.len().div_ceil(batch_size);
        let this: &Self = self;
        Box::new((0..n_batches).map(move |b| {
            let start = b * batch_size;
            let end = (start + batch_size).min(order.len());
            this.load_chunk(&order[start..end], epoch)
        }))
    }
}

/// Loaders, split sizes and class names for an image-folder root with `train/` and `val/`.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub loaders: Splits<FolderLoader>,
    pub sizes: Splits<usize>,
    pub class_names: Vec<String>,
}

pub fn prepare_data(data_dir: &Path, cfg: &LoaderConfig) -> DatasetResult<PreparedData> {
    let datasets = image_datasets(data_dir)?;
    let class_names = datasets.train.class_names().to_vec();
    let sizes = Splits::new(datasets.train.len(), datasets.val.len());
    let transforms = data_transforms();
    // Validation keeps a stable order.
    let val_cfg = LoaderConfig {
        shuffle: false,
        ..cfg.clone()
    };
    let loaders = Splits::new(
        FolderLoader::new(datasets.train, transforms.train, cfg),
        FolderLoader::new(datasets.val, transforms.val, &val_cfg),
    );
    Ok(PreparedData {
        loaders,
        sizes,
        class_names,
    })
}
