//! Per-epoch learning-rate schedules.

/// A learning rate that changes only between epochs.
pub trait EpochScheduler {
    /// Learning rate for optimizer steps in the current epoch.
    fn lr(&self) -> f64;
    /// Advance to the next epoch.
    fn step(&mut self);
}

impl<S: EpochScheduler + ?Sized> EpochScheduler for &mut S {
    fn lr(&self) -> f64 {
        (**self).lr()
    }

    fn step(&mut self) {
        (**self).step()
    }
}

/// Decays the rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLr {
    base_lr: f64,
    step_size: usize,
    gamma: f64,
    epoch: usize,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl Default for StepLr {
    fn default() -> Self {
        Self::new(1e-3, 7, 0.1)
    }
}

impl EpochScheduler for StepLr {
    fn lr(&self) -> f64 {
        self.base_lr * self.gamma.powi((self.epoch / self.step_size) as i32)
    }

    fn step(&mut self) {
        self.epoch += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantLr(pub f64);

impl EpochScheduler for ConstantLr {
    fn lr(&self) -> f64 {
        self.0
    }

    fn step(&mut self) {}
}
