//! Epoch loop with per-phase statistics and best-validation snapshotting.

use burn::module::{AutodiffModule, Module};
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};
use image_dataset::{BatchLoader, Split, Splits};
use models::ImageClassifier;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::criterion::Criterion;
use crate::error::{TrainResult, TrainingError};
use crate::schedule::EpochScheduler;

/// Loss and accuracy of one split in one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub split: Split,
    pub loss: f64,
    pub accuracy: f64,
}

/// Running totals for one pass over a split.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseStats {
    pub running_loss: f64,
    pub running_corrects: usize,
    pub seen: usize,
}

impl PhaseStats {
    /// `batch_loss` is the batch mean; it is weighted by `batch_size`.
    pub fn record(&mut self, batch_loss: f64, batch_size: usize, corrects: usize) {
        self.running_loss += batch_loss * batch_size as f64;
        self.running_corrects += corrects;
        self.seen += batch_size;
    }

    /// Average over the declared split size (not the number of examples seen).
    pub fn finish(&self, epoch: usize, split: Split, split_size: usize) -> TrainResult<EpochMetrics> {
        if split_size == 0 {
            return Err(TrainingError::EmptySplit { split });
        }
        let n = split_size as f64;
        Ok(EpochMetrics {
            epoch,
            split,
            loss: self.running_loss / n,
            accuracy: self.running_corrects as f64 / n,
        })
    }
}

/// Best validation accuracy seen so far and the parameters that produced it.
///
/// Starts at accuracy 0.0 holding the initial parameters; only a strictly
/// greater accuracy replaces the snapshot, so ties keep the earliest one.
#[derive(Debug, Clone)]
pub struct BestCheckpoint<R> {
    accuracy: f64,
    epoch: Option<usize>,
    snapshot: R,
}

impl<R> BestCheckpoint<R> {
    pub fn new(initial: R) -> Self {
        Self {
            accuracy: 0.0,
            epoch: None,
            snapshot: initial,
        }
    }

    /// Returns true when `accuracy` became the new best.
    pub fn observe(&mut self, epoch: usize, accuracy: f64, snapshot: impl FnOnce() -> R) -> bool {
        if accuracy > self.accuracy {
            self.accuracy = accuracy;
            self.epoch = Some(epoch);
            self.snapshot = snapshot();
            true
        } else {
            false
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn epoch(&self) -> Option<usize> {
        self.epoch
    }

    pub fn snapshot(&self) -> &R {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> R {
        self.snapshot
    }
}

/// Result of `train_model`: the model holds the best-validation parameters.
#[derive(Debug)]
pub struct TrainOutcome<M> {
    pub model: M,
    pub best_accuracy: f64,
    /// None when validation accuracy never rose above zero.
    pub best_epoch: Option<usize>,
    pub history: Vec<EpochMetrics>,
    pub elapsed: Duration,
}

/// Per-example arg-max over the class dimension.
pub fn predicted_classes<B: Backend>(outputs: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let n = outputs.dims()[0];
    outputs.argmax(1).reshape([n])
}

pub fn count_correct<B: Backend>(preds: Tensor<B, 1, Int>, labels: Tensor<B, 1, Int>) -> usize {
    preds
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>()
        .max(0) as usize
}

pub(crate) fn class_ids<B: Backend>(preds: Tensor<B, 1, Int>) -> TrainResult<Vec<usize>> {
    let ids = preds
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| TrainingError::TensorData(format!("{e:?}")))?;
    Ok(ids.into_iter().map(|id| id.max(0) as usize).collect())
}

fn scalar<B: Backend>(loss: Tensor<B, 1>) -> f64 {
    loss.into_scalar().elem::<f64>()
}

/// One gradient-free pass over `loader`.
pub fn evaluate<B, M, C, L>(
    device: &B::Device,
    loader: &mut L,
    model: &M,
    criterion: &C,
) -> TrainResult<PhaseStats>
where
    B: Backend,
    M: ImageClassifier<B>,
    C: Criterion,
    L: BatchLoader + ?Sized,
{
    let mut stats = PhaseStats::default();
    for batch in loader.batches() {
        let batch = batch?;
        let (inputs, labels) = batch.to_device::<B>(device);
        let outputs = model.forward(inputs);
        let preds = predicted_classes(outputs.clone());
        let loss = scalar(criterion.loss(outputs, labels.clone()));
        stats.record(loss, batch.len(), count_correct(preds, labels));
    }
    Ok(stats)
}

fn train_epoch<B, M, O, S, C, L>(
    device: &B::Device,
    loader: &mut L,
    mut model: M,
    criterion: &C,
    optimizer: &mut O,
    scheduler: &S,
) -> TrainResult<(M, PhaseStats)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    O: Optimizer<M, B>,
    S: EpochScheduler + ?Sized,
    C: Criterion,
    L: BatchLoader + ?Sized,
{
    let mut stats = PhaseStats::default();
    for batch in loader.batches() {
        let batch = batch?;
        let (inputs, labels) = batch.to_device::<B>(device);
        let outputs = model.forward(inputs);
        let preds = predicted_classes(outputs.clone());
        let loss = criterion.loss(outputs, labels.clone());
        let batch_loss = scalar(loss.clone().detach());
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(scheduler.lr(), model, grads);
        stats.record(batch_loss, batch.len(), count_correct(preds, labels));
    }
    Ok((model, stats))
}

/// Train for `num_epochs`, validating after each epoch, and return the model
/// loaded with the parameters of the best validation epoch.
#[allow(clippy::too_many_arguments)]
pub fn train_model<B, M, O, S, C, L>(
    device: &B::Device,
    dataloaders: &mut Splits<L>,
    dataset_sizes: &Splits<usize>,
    model: M,
    criterion: &C,
    optimizer: &mut O,
    scheduler: &mut S,
    num_epochs: usize,
) -> TrainResult<TrainOutcome<M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
    S: EpochScheduler + ?Sized,
    C: Criterion,
    L: BatchLoader,
{
    let since = Instant::now();
    let mut trace = EpochTrace::from_env();
    let mut model = model;
    let mut best = BestCheckpoint::new(model.clone().into_record());
    let mut history = Vec::with_capacity(num_epochs * Split::ALL.len());

    for epoch in 0..num_epochs {
        println!("Epoch {epoch}/{}", num_epochs - 1);
        println!("{}", "-".repeat(10));

        for split in Split::ALL {
            let loader = dataloaders.get_mut(split);
            let stats = match split {
                Split::Train => {
                    let (trained, stats) = train_epoch::<B, _, _, _, _, _>(
                        device, loader, model, criterion, optimizer, &*scheduler,
                    )?;
                    model = trained;
                    scheduler.step();
                    stats
                }
                Split::Val => evaluate::<B::InnerBackend, _, _, _>(
                    device,
                    loader,
                    &model.valid(),
                    criterion,
                )?,
            };

            let metrics = stats.finish(epoch, split, *dataset_sizes.get(split))?;
            println!(
                "{split} Loss: {:.4} Acc: {:.4}",
                metrics.loss, metrics.accuracy
            );
            if split == Split::Val {
                best.observe(epoch, metrics.accuracy, || model.clone().into_record());
            }
            trace.record(&metrics);
            history.push(metrics);
        }
        println!();
    }

    let elapsed = since.elapsed();
    let secs = elapsed.as_secs();
    println!("Training complete in {}m {}s", secs / 60, secs % 60);
    println!("Best val Acc: {:.4}", best.accuracy());

    let best_accuracy = best.accuracy();
    let best_epoch = best.epoch();
    let model = model.load_record(best.into_snapshot());
    Ok(TrainOutcome {
        model,
        best_accuracy,
        best_epoch,
        history,
        elapsed,
    })
}

/// JSON-lines epoch trace, enabled by pointing `TRAINING_TRACE` at a file.
struct EpochTrace {
    file: Option<File>,
}

impl EpochTrace {
    fn from_env() -> Self {
        let path = match std::env::var("TRAINING_TRACE") {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => return Self { file: None },
        };
        Self::open(&path)
    }

    fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "[training] trace disabled, cannot create {}: {e}",
                        parent.display()
                    );
                    return Self { file: None };
                }
            }
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self { file: Some(file) },
            Err(e) => {
                eprintln!("[training] trace disabled, cannot open {}: {e}", path.display());
                Self { file: None }
            }
        }
    }

    fn record(&mut self, metrics: &EpochMetrics) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let written = serde_json::to_string(metrics)
            .map_err(std::io::Error::other)
            .and_then(|line| writeln!(file, "{line}"));
        if let Err(e) = written {
            eprintln!("[training] trace write failed, disabling: {e}");
            self.file = None;
        }
    }
}
