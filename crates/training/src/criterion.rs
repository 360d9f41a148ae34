use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Maps `(logits, true labels)` to a scalar loss on whichever backend the tensors live on.
pub trait Criterion {
    fn loss<B: Backend>(&self, output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1>;
}

/// Mean cross-entropy over the batch.
#[derive(Debug, Clone, Default)]
pub struct CrossEntropy {
    pub smoothing: Option<f32>,
}

impl Criterion for CrossEntropy {
    fn loss<B: Backend>(&self, output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let device = output.device();
        CrossEntropyLossConfig::new()
            .with_smoothing(self.smoothing)
            .init(&device)
            .forward(output, targets)
    }
}
