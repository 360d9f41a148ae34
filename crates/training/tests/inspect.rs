use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn_ndarray::NdArray;
use image_dataset::{ImageBatch, InMemoryLoader};
use training::{
    collect_misclassified, explore_wrong_5x5, predicted_classes, visualize_model,
    BaselineClassifier, BaselineClassifierConfig, ImageClassifier, TrainingError,
};
use vision_core::{Figure, GridLayout};

type Inner = NdArray<f32>;
type B = Autodiff<Inner>;

const SIDE: usize = 4;

fn model() -> BaselineClassifier<B> {
    BaselineClassifier::new(
        BaselineClassifierConfig {
            num_classes: 2,
            hidden: 8,
            pooled: 2,
        },
        &Default::default(),
    )
}

fn images(n: usize, offset: usize) -> Vec<f32> {
    let per = 3 * SIDE * SIDE;
    (0..n * per)
        .map(|i| ((offset + i * 7) % 11) as f32 / 5.0 - 1.0)
        .collect()
}

fn predictions(model: &BaselineClassifier<B>, batch: &ImageBatch) -> Vec<usize> {
    let (x, _) = batch.to_device::<Inner>(&Default::default());
    predicted_classes(model.valid().forward(x))
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .unwrap()
        .into_iter()
        .map(|p| p as usize)
        .collect()
}

/// Batches whose labels are chosen from each example's global position and the model's prediction.
fn loader(
    model: &BaselineClassifier<B>,
    batch_sizes: &[usize],
    label: impl Fn(usize, usize) -> usize,
) -> InMemoryLoader {
    let mut global = 0;
    let batches = batch_sizes
        .iter()
        .enumerate()
        .map(|(b, &n)| {
            let shape = [n, 3, SIDE, SIDE];
            let pixels = images(n, b * 13);
            let probe = ImageBatch::new(pixels.clone(), shape, vec![0; n]).unwrap();
            let labels = predictions(model, &probe)
                .into_iter()
                .map(|pred| {
                    let l = label(global, pred);
                    global += 1;
                    l
                })
                .collect();
            ImageBatch::new(pixels, shape, labels).unwrap()
        })
        .collect();
    InMemoryLoader::new(batches)
}

fn names() -> Vec<String> {
    vec!["ants".to_string(), "bees".to_string()]
}

fn drawn(figure: &Figure) -> Vec<&str> {
    figure.titles().iter().flatten().map(String::as_str).collect()
}

fn visualize(
    model: &BaselineClassifier<B>,
    val: &mut InMemoryLoader,
    names: &[String],
    num_images: usize,
    figure: &mut Figure,
) -> Result<usize, TrainingError> {
    visualize_model::<B, _, _, _>(&Default::default(), val, names, model, num_images, figure)
}

#[test]
fn visualizer_stops_at_the_requested_count() {
    let model = model();
    let mut val = loader(&model, &[4, 4, 4], |_, pred| pred);
    let mut figure = Figure::new(8);

    let shown = visualize(&model, &mut val, &names(), 6, &mut figure).unwrap();

    assert_eq!(shown, 6);
    assert_eq!(figure.layout(), Some(GridLayout::new(3, 2)));
    let titles = drawn(&figure);
    assert_eq!(titles.len(), 6);
    assert!(titles
        .iter()
        .all(|t| *t == "predicted: ants" || *t == "predicted: bees"));
}

#[test]
fn visualizer_exhausts_short_datasets() {
    let model = model();
    let mut val = loader(&model, &[3], |_, pred| pred);
    let mut figure = Figure::new(8);

    let shown = visualize(&model, &mut val, &names(), 6, &mut figure).unwrap();

    assert_eq!(shown, 3);
    assert_eq!(figure.layout(), Some(GridLayout::new(3, 2)));
    assert_eq!(drawn(&figure).len(), 3);
}

#[test]
fn visualizer_odd_counts_round_rows_up() {
    let model = model();
    let mut val = loader(&model, &[4, 4], |_, pred| pred);
    let mut figure = Figure::new(8);

    let shown = visualize(&model, &mut val, &names(), 5, &mut figure).unwrap();

    assert_eq!(shown, 5);
    assert_eq!(figure.layout(), Some(GridLayout::new(3, 2)));
    assert!(figure.titles()[5].is_none());
}

#[test]
fn visualizer_with_zero_images_draws_nothing() {
    let model = model();
    let mut val = loader(&model, &[4], |_, pred| pred);
    let mut figure = Figure::new(8);

    let shown = visualize(&model, &mut val, &names(), 0, &mut figure).unwrap();

    assert_eq!(shown, 0);
    assert_eq!(figure.layout(), None);
}

#[test]
fn visualizer_rejects_predictions_without_a_name() {
    let model = model();
    let mut val = loader(&model, &[2], |_, pred| pred);
    let mut figure = Figure::new(8);

    let err = visualize(&model, &mut val, &[], 2, &mut figure).unwrap_err();
    assert!(matches!(err, TrainingError::UnknownClass { classes: 0, .. }));
}

#[test]
fn misclassified_examples_keep_dataset_order() {
    let model = model();
    let wrong_at = [1usize, 4, 6];
    let mut data = loader(&model, &[4, 4], |i, pred| {
        if wrong_at.contains(&i) {
            1 - pred
        } else {
            pred
        }
    });

    let wrong =
        collect_misclassified::<Inner, _, _>(&Default::default(), &mut data, &model.valid())
            .unwrap();

    assert_eq!(wrong.len(), 3);
    for item in &wrong {
        assert_eq!(item.truth, 1 - item.predicted);
        assert_eq!(item.image.dims(), [3, SIDE, SIDE]);
    }

    let mut all = Vec::new();
    for b in 0..2 {
        let probe = ImageBatch::new(images(4, b * 13), [4, 3, SIDE, SIDE], vec![0; 4]).unwrap();
        all.extend(predictions(&model, &probe));
    }
    let expected: Vec<usize> = wrong_at.iter().map(|&i| all[i]).collect();
    let got: Vec<usize> = wrong.iter().map(|w| w.predicted).collect();
    assert_eq!(got, expected);
}

#[test]
fn explorer_fills_a_5x5_grid_with_titled_mistakes() {
    let model = model();
    let mut data = loader(&model, &[8, 8, 8, 6], |_, pred| 1 - pred);
    let names = names();
    let mut figure = Figure::new(8);

    let sampled = explore_wrong_5x5::<B, _, _, _>(
        &mut data,
        &model,
        &Default::default(),
        Some(names.as_slice()),
        Some(42),
        false,
        &mut figure,
    )
    .unwrap();

    assert_eq!(sampled.len(), 25);
    let mut distinct = sampled.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), 25);
    assert!(sampled.iter().all(|&i| i < 30));

    assert_eq!(figure.layout(), Some(GridLayout::new(5, 5)));
    let titles = drawn(&figure);
    assert_eq!(titles.len(), 25);
    assert!(titles
        .iter()
        .all(|t| *t == "True:ants, Guess:bees" || *t == "True:bees, Guess:ants"));
}

#[test]
fn explorer_is_deterministic_for_a_seed() {
    let model = model();
    let run = |seed| {
        let mut data = loader(&model, &[8, 8, 8, 6], |_, pred| 1 - pred);
        let mut figure = Figure::new(8);
        let sampled = explore_wrong_5x5::<B, _, _, _>(
            &mut data,
            &model,
            &Default::default(),
            None,
            Some(seed),
            false,
            &mut figure,
        )
        .unwrap();
        let titles: Vec<String> = drawn(&figure).into_iter().map(str::to_string).collect();
        (sampled, titles)
    };

    let (a, titles_a) = run(7);
    let (b, titles_b) = run(7);
    assert_eq!(a, b);
    assert_eq!(titles_a, titles_b);
    assert!(titles_a
        .iter()
        .all(|t| t == "True:0, Guess:1" || t == "True:1, Guess:0"));
}

#[test]
fn explorer_needs_25_mistakes_without_replacement() {
    let model = model();
    let mut data = loader(&model, &[8, 8], |i, pred| if i < 3 { 1 - pred } else { pred });
    let mut figure = Figure::new(8);

    let err = explore_wrong_5x5::<B, _, _, _>(
        &mut data,
        &model,
        &Default::default(),
        None,
        Some(1),
        false,
        &mut figure,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        TrainingError::InsufficientSamples {
            available: 3,
            requested: 25
        }
    ));
    assert_eq!(figure.layout(), None);
}

#[test]
fn explorer_with_replacement_reuses_few_mistakes() {
    let model = model();
    let mut data = loader(&model, &[8, 8], |i, pred| if i < 3 { 1 - pred } else { pred });
    let names = names();
    let mut figure = Figure::new(8);

    let sampled = explore_wrong_5x5::<B, _, _, _>(
        &mut data,
        &model,
        &Default::default(),
        Some(names.as_slice()),
        Some(1),
        true,
        &mut figure,
    )
    .unwrap();

    assert_eq!(sampled.len(), 25);
    assert!(sampled.iter().all(|&i| i < 3));
    assert_eq!(drawn(&figure).len(), 25);
}
