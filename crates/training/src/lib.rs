#![recursion_limit = "256"]

pub mod criterion;
pub mod driver;
pub mod error;
pub mod inspect;
pub mod schedule;
pub mod util;

pub use criterion::{Criterion, CrossEntropy};
pub use driver::{
    count_correct, evaluate, predicted_classes, train_model, BestCheckpoint, EpochMetrics,
    PhaseStats, TrainOutcome,
};
pub use error::{TrainResult, TrainingError};
pub use inspect::{
    collect_misclassified, explore_wrong_5x5, sample_indices, seeded_rng, visualize_model,
    Misclassified, EXPLORE_GRID,
};
pub use models::{BaselineClassifier, BaselineClassifierConfig, ImageClassifier};
pub use schedule::{ConstantLr, EpochScheduler, StepLr};
pub use util::{run_explore, run_train, ExploreArgs, TrainArgs};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
