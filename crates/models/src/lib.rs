//! Burn image classifiers for the training helpers.
//!
//! - `ImageClassifier`: the seam the training driver, visualizer and explorer call through.
//! - `BaselineClassifier`: a small pooled-feature network used by the CLI and tests.
//!
//! Any Burn module mapping `[N, C, H, W]` images to `[N, classes]` logits can implement
//! `ImageClassifier` and be trained with the same driver.

use burn::module::Module;
use burn::nn;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Forward contract: images in, one row of class logits per image out.
pub trait ImageClassifier<B: Backend> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

#[derive(Debug, Clone)]
pub struct BaselineClassifierConfig {
    pub num_classes: usize,
    pub hidden: usize,
    /// Side of the adaptive pooling grid applied before the dense layers.
    pub pooled: usize,
}

impl Default for BaselineClassifierConfig {
    fn default() -> Self {
        Self {
            num_classes: 2,
            hidden: 64,
            pooled: 8,
        }
    }
}

#[derive(Debug, Module)]
pub struct BaselineClassifier<B: Backend> {
    pool: AdaptiveAvgPool2d,
    hidden: nn::Linear<B>,
    head: nn::Linear<B>,
    features: usize,
}

impl<B: Backend> BaselineClassifier<B> {
    pub fn new(cfg: BaselineClassifierConfig, device: &B::Device) -> Self {
        let pooled = cfg.pooled.max(1);
        let features = 3 * pooled * pooled;
        let pool = AdaptiveAvgPool2dConfig::new([pooled, pooled]).init();
        let hidden = nn::LinearConfig::new(features, cfg.hidden).init(device);
        let head = nn::LinearConfig::new(cfg.hidden, cfg.num_classes.max(1)).init(device);
        Self {
            pool,
            hidden,
            head,
            features,
        }
    }
}

impl<B: Backend> ImageClassifier<B> for BaselineClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let batch = images.dims()[0];
        let x = self.pool.forward(images).reshape([batch, self.features]);
        let x = relu(self.hidden.forward(x));
        self.head.forward(x)
    }
}

pub mod prelude {
    pub use super::{BaselineClassifier, BaselineClassifierConfig, ImageClassifier};
}
