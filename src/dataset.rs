//! Training-set export for the external model trainer.
//!
//! Samples live in `<root>/<LABEL>/*.json`. Each file is a list of frames,
//! each frame a list of hands (first right, then left), each hand a list of
//! landmarks. The export writes `X.npy` with shape
//! `(samples, sequence_length, 126)`, `y.npy` with class indices, and a
//! `metadata.json` sidecar naming the classes in index order.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3, Axis};
use ndarray_npy::write_npy;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::DatasetError;
use crate::landmarks::{Frame, RawLandmark};
use crate::sequence_model::{build_sequence_tensor, ModelMetadata, NUM_FEATURES};

/// Hands per frame, landmarks per hand.
pub type RawFrame = Vec<Vec<RawLandmark>>;

pub fn frames_from_raw(sample: &[RawFrame]) -> Vec<Frame> {
    sample
        .iter()
        .enumerate()
        .map(|(i, hands)| {
            Frame::from_raw(
                hands.first().map(Vec::as_slice),
                hands.get(1).map(Vec::as_slice),
                None,
                None,
                i as f64 / crate::motion::ASSUMED_FPS as f64,
            )
        })
        .collect()
}

/// The classifier input for one recorded gesture.
pub fn sample_tensor(sample: &[RawFrame], sequence_length: usize) -> Array2<f32> {
    build_sequence_tensor(&frames_from_raw(sample), sequence_length)
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array3<f32>,
    pub y: Array1<i64>,
    pub class_names: Vec<String>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn write(&self, out_dir: &Path) -> Result<(), DatasetError> {
        fs::create_dir_all(out_dir).map_err(|source| DatasetError::Io {
            path: out_dir.to_path_buf(),
            source,
        })?;
        write_npy(out_dir.join("X.npy"), &self.x)?;
        write_npy(out_dir.join("y.npy"), &self.y)?;

        let mut metadata = ModelMetadata::new(self.class_names.clone());
        metadata.sequence_length = self.x.len_of(Axis(1));
        let metadata_path = out_dir.join("metadata.json");
        fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?).map_err(|source| {
            DatasetError::Io {
                path: metadata_path,
                source,
            }
        })?;

        info!(samples = self.len(), classes = self.class_names.len(), out = %out_dir.display(), "dataset written");
        Ok(())
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    Ok(paths)
}

fn load_sample(path: &Path, sequence_length: usize) -> Result<Array2<f32>, DatasetError> {
    let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let sample: Vec<RawFrame> = serde_json::from_str(&text).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sample_tensor(&sample, sequence_length))
}

/// Load every sample under `root`. Classes are the sub-directory names in
/// sorted order. Unreadable samples are logged and skipped.
pub fn load_dataset(root: &Path, sequence_length: usize) -> Result<Dataset, DatasetError> {
    let mut class_names = Vec::new();
    let mut files: Vec<(usize, PathBuf)> = Vec::new();

    for dir in read_dir_sorted(root)?.into_iter().filter(|p| p.is_dir()) {
        let Some(label) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let samples: Vec<PathBuf> = read_dir_sorted(&dir)?
            .into_iter()
            .filter(|p| p.extension().map_or(false, |e| e == "json"))
            .collect();
        if samples.is_empty() {
            continue;
        }
        info!(label = %label, samples = samples.len(), "loading gesture samples");
        let index = class_names.len();
        class_names.push(label);
        files.extend(samples.into_iter().map(|p| (index, p)));
    }

    let loaded: Vec<(usize, Array2<f32>)> = files
        .par_iter()
        .filter_map(|(index, path)| match load_sample(path, sequence_length) {
            Ok(tensor) => Some((*index, tensor)),
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping sample");
                None
            }
        })
        .collect();

    if loaded.is_empty() {
        return Err(DatasetError::Empty(root.to_path_buf()));
    }

    let mut x = Array3::<f32>::zeros((loaded.len(), sequence_length, NUM_FEATURES));
    let mut y = Array1::<i64>::zeros(loaded.len());
    for (i, (index, tensor)) in loaded.iter().enumerate() {
        x.index_axis_mut(Axis(0), i).assign(tensor);
        y[i] = *index as i64;
    }

    Ok(Dataset { x, y, class_names })
}
