//! Qualitative inspection: prediction grids and misclassification sampling.

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use image_dataset::BatchLoader;
use models::ImageClassifier;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vision_core::{view_grid, GridLayout, PlotSurface};

use crate::driver::{class_ids, predicted_classes};
use crate::error::{TrainResult, TrainingError};

/// Side length of the explorer grid.
pub const EXPLORE_GRID: usize = 5;

/// An example the model got wrong, kept on the device it was evaluated on.
#[derive(Debug, Clone)]
pub struct Misclassified<B: Backend> {
    pub image: Tensor<B, 3>,
    pub predicted: usize,
    pub truth: usize,
}

fn example<B: Backend>(images: &Tensor<B, 4>, index: usize) -> Tensor<B, 3> {
    let [_, c, h, w] = images.dims();
    images
        .clone()
        .slice([index..index + 1, 0..c, 0..h, 0..w])
        .reshape([c, h, w])
}

fn class_name(names: &[String], id: usize) -> TrainResult<&str> {
    names
        .get(id)
        .map(String::as_str)
        .ok_or(TrainingError::UnknownClass {
            id,
            classes: names.len(),
        })
}

fn label_text(names: Option<&[String]>, id: usize) -> TrainResult<String> {
    match names {
        Some(names) if !names.is_empty() => class_name(names, id).map(str::to_string),
        _ => Ok(id.to_string()),
    }
}

/// Draw up to `num_images` validation examples titled with their predicted class.
///
/// The grid is `ceil(num_images / 2)` rows by 2 columns. Returns how many images
/// were drawn, which is fewer than requested when the loader runs out.
pub fn visualize_model<B, M, L, P>(
    device: &B::Device,
    val_loader: &mut L,
    class_names: &[String],
    model: &M,
    num_images: usize,
    surface: &mut P,
) -> TrainResult<usize>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    L: BatchLoader + ?Sized,
    P: PlotSurface + ?Sized,
{
    if num_images == 0 {
        return Ok(0);
    }
    let model = model.valid();
    surface.begin_grid(GridLayout::new(num_images.div_ceil(2), 2));

    let mut images_so_far = 0;
    for batch in val_loader.batches() {
        let batch = batch?;
        let (inputs, _) = batch.to_device::<B::InnerBackend>(device);
        let preds = class_ids(predicted_classes(model.forward(inputs.clone())))?;
        for (j, pred) in preds.into_iter().enumerate() {
            surface.select_cell(images_so_far)?;
            images_so_far += 1;
            let title = format!("predicted: {}", class_name(class_names, pred)?);
            view_grid(surface, example(&inputs, j), Some(&title))?;
            if images_so_far == num_images {
                return Ok(images_so_far);
            }
        }
    }
    Ok(images_so_far)
}

/// Every example whose arg-max prediction differs from its label, in batch then in-batch order.
pub fn collect_misclassified<B, M, L>(
    device: &B::Device,
    loader: &mut L,
    model: &M,
) -> TrainResult<Vec<Misclassified<B>>>
where
    B: Backend,
    M: ImageClassifier<B>,
    L: BatchLoader + ?Sized,
{
    let mut wrong = Vec::new();
    for batch in loader.batches() {
        let batch = batch?;
        let (inputs, _) = batch.to_device::<B>(device);
        let preds = class_ids(predicted_classes(model.forward(inputs.clone())))?;
        for (ix, (&predicted, &truth)) in preds.iter().zip(batch.labels()).enumerate() {
            if predicted != truth {
                wrong.push(Misclassified {
                    image: example(&inputs, ix),
                    predicted,
                    truth,
                });
            }
        }
    }
    Ok(wrong)
}

/// Draw `count` indices uniformly from `0..available`.
pub fn sample_indices<R: Rng + ?Sized>(
    rng: &mut R,
    available: usize,
    count: usize,
    replace: bool,
) -> TrainResult<Vec<usize>> {
    let insufficient = if replace {
        available == 0 && count > 0
    } else {
        available < count
    };
    if insufficient {
        return Err(TrainingError::InsufficientSamples {
            available,
            requested: count,
        });
    }
    if replace {
        Ok((0..count).map(|_| rng.random_range(0..available)).collect())
    } else {
        Ok(rand::seq::index::sample(rng, available, count).into_vec())
    }
}

pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Sample 25 misclassified examples and draw them in a 5x5 grid titled
/// `True:<t>, Guess:<g>`. Returns the sampled positions within the
/// misclassified collection.
#[allow(clippy::too_many_arguments)]
pub fn explore_wrong_5x5<B, M, L, P>(
    loader: &mut L,
    model: &M,
    device: &B::Device,
    class_labels: Option<&[String]>,
    seed: Option<u64>,
    replace: bool,
    surface: &mut P,
) -> TrainResult<Vec<usize>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    L: BatchLoader + ?Sized,
    P: PlotSurface + ?Sized,
{
    let model = model.valid();
    let mut rng = seeded_rng(seed);
    let wrong = collect_misclassified::<B::InnerBackend, _, _>(device, loader, &model)?;
    let cells = EXPLORE_GRID * EXPLORE_GRID;
    let sampled = sample_indices(&mut rng, wrong.len(), cells, replace)?;

    surface.begin_grid(GridLayout::new(EXPLORE_GRID, EXPLORE_GRID));
    for (cell, &ix) in sampled.iter().enumerate() {
        let item = &wrong[ix];
        surface.select_cell(cell)?;
        let title = format!(
            "True:{}, Guess:{}",
            label_text(class_labels, item.truth)?,
            label_text(class_labels, item.predicted)?
        );
        view_grid(surface, item.image.clone(), Some(&title))?;
    }
    Ok(sampled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_replacement_draws_distinct_indices() {
        let mut rng = seeded_rng(Some(3));
        let mut picked = sample_indices(&mut rng, 30, 25, false).unwrap();
        picked.sort_unstable();
        picked.dedup();
        assert_eq!(picked.len(), 25);
        assert!(picked.iter().all(|&i| i < 30));
    }

    #[test]
    fn same_seed_same_draws() {
        let a = sample_indices(&mut seeded_rng(Some(11)), 40, 25, false).unwrap();
        let b = sample_indices(&mut seeded_rng(Some(11)), 40, 25, false).unwrap();
        assert_eq!(a, b);
        let c = sample_indices(&mut seeded_rng(Some(11)), 4, 25, true).unwrap();
        let d = sample_indices(&mut seeded_rng(Some(11)), 4, 25, true).unwrap();
        assert_eq!(c, d);
    }

    #[test]
    fn too_few_without_replacement_is_reported() {
        let err = sample_indices(&mut seeded_rng(Some(0)), 24, 25, false).unwrap_err();
        assert!(matches!(
            err,
            TrainingError::InsufficientSamples {
                available: 24,
                requested: 25
            }
        ));
        let err = sample_indices(&mut seeded_rng(Some(0)), 0, 25, true).unwrap_err();
        assert!(matches!(err, TrainingError::InsufficientSamples { available: 0, .. }));
    }

    #[test]
    fn labels_fall_back_to_ids() {
        let names = vec!["ants".to_string(), "bees".to_string()];
        assert_eq!(label_text(Some(names.as_slice()), 1).unwrap(), "bees");
        assert_eq!(label_text(Some(&[][..]), 1).unwrap(), "1");
        assert_eq!(label_text(None, 0).unwrap(), "0");
        assert!(matches!(
            label_text(Some(names.as_slice()), 2),
            Err(TrainingError::UnknownClass { id: 2, classes: 2 })
        ));
    }
}
