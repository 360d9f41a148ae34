//! Image-folder datasets: `<root>/<class_name>/<image files>`.

use crate::types::{DatasetError, DatasetResult, Splits};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan `root`. Class ids follow the sorted order of the class directory names.
    pub fn open(root: &Path) -> DatasetResult<Self> {
        let mut classes = Vec::new();
        for entry in read_dir(root)? {
            let path = entry.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    classes.push(name.to_string());
                }
            }
        }
        if classes.is_empty() {
            return Err(DatasetError::NoClasses {
                root: root.to_path_buf(),
            });
        }
        classes.sort();

        let mut samples = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let class_dir = root.join(class);
            let mut files: Vec<PathBuf> = read_dir(&class_dir)?
                .into_iter()
                .map(|e| e.path())
                .filter(|p| p.is_file() && has_image_extension(p))
                .collect();
            files.sort();
            samples.extend(files.into_iter().map(|path| ImageSample { path, label }));
        }

        Ok(Self {
            root: root.to_path_buf(),
            classes,
            samples,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn class_names(&self) -> &[String] {
        &self.classes
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Open `<data_dir>/train` and `<data_dir>/val`; both must list the same classes.
pub fn image_datasets(data_dir: &Path) -> DatasetResult<Splits<ImageFolder>> {
    let train = ImageFolder::open(&data_dir.join("train"))?;
    let val = ImageFolder::open(&data_dir.join("val"))?;
    if train.class_names() != val.class_names() {
        return Err(DatasetError::ClassMismatch {
            train: train.class_names().to_vec(),
            val: val.class_names().to_vec(),
        });
    }
    Ok(Splits::new(train, val))
}

fn read_dir(dir: &Path) -> DatasetResult<Vec<fs::DirEntry>> {
    let io_err = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };
    fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
