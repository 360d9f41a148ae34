use clap::Args;
use image_dataset::LoaderConfig;
use models::BaselineClassifierConfig;
use std::path::PathBuf;
use vision_core::Figure;

/// Image-folder input shared by the training and inspection binaries.
#[derive(Debug, Clone, Args)]
pub struct DataArgs {
    /// Dataset root containing train/ and val/, one sub-directory per class.
    #[arg(long, default_value = "data/hymenoptera_data")]
    pub data_dir: PathBuf,
    /// Examples per batch.
    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,
    /// Disable shuffling of the training split.
    #[arg(long, default_value_t = false)]
    pub no_shuffle: bool,
    /// Seed for shuffling, augmentation and sampling (OS entropy when omitted).
    #[arg(long)]
    pub seed: Option<u64>,
}

impl DataArgs {
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            batch_size: self.batch_size.max(1),
            shuffle: !self.no_shuffle,
            seed: self.seed,
        }
    }
}

/// Baseline classifier shape; must match between training and any later load.
#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Hidden layer width.
    #[arg(long, default_value_t = 64)]
    pub hidden: usize,
    /// Side of the pooled feature grid.
    #[arg(long, default_value_t = 8)]
    pub pooled: usize,
}

impl ModelArgs {
    pub fn config(&self, num_classes: usize) -> BaselineClassifierConfig {
        BaselineClassifierConfig {
            num_classes,
            hidden: self.hidden,
            pooled: self.pooled,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct FigureArgs {
    /// Side length of each figure cell in pixels.
    #[arg(long, default_value_t = 224)]
    pub tile: u32,
}

impl FigureArgs {
    pub fn figure(&self) -> Figure {
        Figure::new(self.tile)
    }
}
