use burn::backend::Autodiff;
use burn::module::Module;
use burn::optim::momentum::MomentumConfig;
use burn::optim::SgdConfig;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use cli_support::{DataArgs, FigureArgs, ModelArgs};
use image_dataset::{prepare_data, PreparedData, Split, Splits};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    explore_wrong_5x5, train_model, visualize_model, BaselineClassifier,
    BaselineClassifierConfig, CrossEntropy, StepLr, TrainBackend,
};
use clap::{Parser, ValueEnum};

type ADBackend = Autodiff<TrainBackend>;
type Device = <ADBackend as burn::tensor::backend::Backend>::Device;

pub fn save_classifier_checkpoint(
    model: &BaselineClassifier<ADBackend>,
    path: &Path,
) -> Result<(), RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model.clone().save_file(path, &recorder)
}

pub fn load_classifier_from_checkpoint<P: AsRef<Path>>(
    path: P,
    cfg: BaselineClassifierConfig,
    device: &Device,
) -> Result<BaselineClassifier<ADBackend>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    BaselineClassifier::<ADBackend>::new(cfg, device).load_file(path.as_ref(), &recorder, device)
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitArg {
    Train,
    Val,
}

impl From<SplitArg> for Split {
    fn from(value: SplitArg) -> Self {
        match value {
            SplitArg::Train => Split::Train,
            SplitArg::Val => Split::Val,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Fine-tune the baseline image classifier on an image-folder dataset"
)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,
    #[command(flatten)]
    pub model: ModelArgs,
    #[command(flatten)]
    pub figure: FigureArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Number of epochs.
    #[arg(long, default_value_t = 25)]
    pub epochs: usize,
    /// Initial learning rate.
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,
    /// SGD momentum.
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,
    /// Epochs between learning-rate decays.
    #[arg(long, default_value_t = 7)]
    pub step_size: usize,
    /// Multiplicative learning-rate decay.
    #[arg(long, default_value_t = 0.1)]
    pub gamma: f64,
    /// Optional cross-entropy label smoothing.
    #[arg(long)]
    pub label_smoothing: Option<f32>,
    /// Checkpoint output path for the best-validation parameters.
    #[arg(long, default_value = "checkpoints/baseline_classifier.bin")]
    pub checkpoint_out: PathBuf,
    /// Optional JSON file for per-epoch loss/accuracy history.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
    /// Validation predictions to draw after training (0 disables the figure).
    #[arg(long, default_value_t = 6)]
    pub num_images: usize,
    /// Output path for the prediction figure.
    #[arg(long, default_value = "artifacts/figures/predictions.png")]
    pub figure_out: PathBuf,
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;

    let cfg = args.data.loader_config();
    let PreparedData {
        mut loaders,
        sizes,
        class_names,
    } = prepare_data(&args.data.data_dir, &cfg).map_err(|e| {
        anyhow::anyhow!(
            "failed to load image folders under {}: {e}",
            args.data.data_dir.display()
        )
    })?;
    ensure_nonempty_splits(&args.data.data_dir, &sizes)?;
    println!(
        "classes: {} (train {}, val {})",
        class_names.join(", "),
        sizes.train,
        sizes.val
    );
    println!("train transforms: {}", loaders.train.pipeline().describe());
    println!("val transforms: {}", loaders.val.pipeline().describe());

    let device = Device::default();
    let model = BaselineClassifier::<ADBackend>::new(args.model.config(class_names.len()), &device);
    let mut optim = SgdConfig::new()
        .with_momentum(Some(MomentumConfig::new().with_momentum(args.momentum)))
        .init();
    let mut scheduler = StepLr::new(args.lr, args.step_size, args.gamma);
    let criterion = CrossEntropy {
        smoothing: args.label_smoothing,
    };

    let outcome = train_model::<ADBackend, _, _, _, _, _>(
        &device,
        &mut loaders,
        &sizes,
        model,
        &criterion,
        &mut optim,
        &mut scheduler,
        args.epochs,
    )?;

    if let Some(parent) = args.checkpoint_out.parent() {
        fs::create_dir_all(parent)?;
    }
    save_classifier_checkpoint(&outcome.model, &args.checkpoint_out)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
    println!("Saved checkpoint to {}", args.checkpoint_out.display());

    if let Some(path) = &args.metrics_out {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(&outcome.history)?)?;
        println!("Wrote epoch history to {}", path.display());
    }

    let mut figure = args.figure.figure();
    let shown = visualize_model::<ADBackend, _, _, _>(
        &device,
        &mut loaders.val,
        &class_names,
        &outcome.model,
        args.num_images,
        &mut figure,
    )?;
    if shown > 0 {
        figure.save(&args.figure_out)?;
        println!("Saved {shown} predictions to {}", args.figure_out.display());
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "explore",
    about = "Show a 5x5 grid of misclassified examples from a trained checkpoint"
)]
pub struct ExploreArgs {
    #[command(flatten)]
    pub data: DataArgs,
    #[command(flatten)]
    pub model: ModelArgs,
    #[command(flatten)]
    pub figure: FigureArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Checkpoint path to load.
    #[arg(long, default_value = "checkpoints/baseline_classifier.bin")]
    pub checkpoint: PathBuf,
    /// Split to scan for mistakes.
    #[arg(long, value_enum, default_value_t = SplitArg::Val)]
    pub split: SplitArg,
    /// Sample with replacement (allows fewer than 25 mistakes).
    #[arg(long, default_value_t = false)]
    pub replace: bool,
    /// Title cells with raw class ids instead of class names.
    #[arg(long, default_value_t = false)]
    pub raw_ids: bool,
    /// Output path for the misclassification figure.
    #[arg(long, default_value = "artifacts/figures/misclassified.png")]
    pub figure_out: PathBuf,
}

pub fn run_explore(args: ExploreArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;

    let cfg = args.data.loader_config();
    let PreparedData {
        mut loaders,
        class_names,
        ..
    } = prepare_data(&args.data.data_dir, &cfg).map_err(|e| {
        anyhow::anyhow!(
            "failed to load image folders under {}: {e}",
            args.data.data_dir.display()
        )
    })?;

    let device = Device::default();
    let model = load_classifier_from_checkpoint(
        &args.checkpoint,
        args.model.config(class_names.len()),
        &device,
    )
    .map_err(|e| {
        anyhow::anyhow!(
            "failed to load checkpoint {}: {e}",
            args.checkpoint.display()
        )
    })?;

    let labels = (!args.raw_ids).then_some(class_names.as_slice());
    let mut figure = args.figure.figure();
    let split = Split::from(args.split);
    let sampled = explore_wrong_5x5::<ADBackend, _, _, _>(
        loaders.get_mut(split),
        &model,
        &device,
        labels,
        args.data.seed,
        args.replace,
        &mut figure,
    )?;
    figure.save(&args.figure_out)?;
    println!(
        "Saved {} misclassified {split} examples to {}",
        sampled.len(),
        args.figure_out.display()
    );
    Ok(())
}

/// Both splits need images before any epoch runs.
fn ensure_nonempty_splits(data_dir: &Path, sizes: &Splits<usize>) -> anyhow::Result<()> {
    for split in Split::ALL {
        if *sizes.get(split) == 0 {
            anyhow::bail!(
                "no {split} images found under {}",
                data_dir.join(split.as_str()).display()
            );
        }
    }
    Ok(())
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            println!("note: built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_args_defaults() {
        let args = TrainArgs::parse_from(["train"]);
        assert_eq!(args.epochs, 25);
        assert_eq!(args.step_size, 7);
        assert!((args.gamma - 0.1).abs() < 1e-12);
        assert!((args.momentum - 0.9).abs() < 1e-12);
        assert_eq!(args.num_images, 6);
        assert_eq!(args.data.batch_size, 4);
    }

    #[test]
    fn explore_args_select_split() {
        let args = ExploreArgs::parse_from(["explore", "--split", "train", "--replace"]);
        assert_eq!(Split::from(args.split), Split::Train);
        assert!(args.replace);
        assert!(!args.raw_ids);
    }

    #[test]
    fn checkpoint_round_trips_through_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let device = Device::default();
        let cfg = BaselineClassifierConfig {
            num_classes: 3,
            hidden: 4,
            pooled: 2,
        };
        let model = BaselineClassifier::<ADBackend>::new(cfg.clone(), &device);
        save_classifier_checkpoint(&model, &path).unwrap();
        assert!(load_classifier_from_checkpoint(&path, cfg, &device).is_ok());
    }

    #[test]
    fn empty_splits_are_rejected_up_front() {
        let root = Path::new("data");
        assert!(ensure_nonempty_splits(root, &Splits::new(4, 2)).is_ok());
        let err = ensure_nonempty_splits(root, &Splits::new(4, 0)).unwrap_err();
        assert!(err.to_string().contains("no val images"), "{err}");
        let err = ensure_nonempty_splits(root, &Splits::new(0, 2)).unwrap_err();
        assert!(err.to_string().contains("no train images"), "{err}");
    }

    #[test]
    fn empty_val_folder_stops_before_training() {
        let dir = tempfile::tempdir().unwrap();
        for class in ["ants", "bees"] {
            let train = dir.path().join("train").join(class);
            fs::create_dir_all(&train).unwrap();
            image::RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]))
                .save(train.join("a.png"))
                .unwrap();
            fs::create_dir_all(dir.path().join("val").join(class)).unwrap();
        }
        let ckpt = dir.path().join("out").join("model.bin");
        let data_dir = dir.path().display().to_string();
        let ckpt_arg = ckpt.display().to_string();
        let args = TrainArgs::parse_from([
            "train",
            "--data-dir",
            &data_dir,
            "--epochs",
            "1",
            "--checkpoint-out",
            &ckpt_arg,
        ]);

        let err = run_train(args).unwrap_err();
        assert!(err.to_string().contains("no val images"), "{err}");
        assert!(!ckpt.exists());
    }

    #[cfg(not(feature = "backend-wgpu"))]
    #[test]
    fn wgpu_requires_feature() {
        assert!(validate_backend_choice(BackendKind::Wgpu).is_err());
        assert!(validate_backend_choice(BackendKind::NdArray).is_ok());
    }
}
