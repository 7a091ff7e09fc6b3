pub mod model_onnx;

use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ModelError;
use crate::landmarks::{Frame, HAND_LANDMARKS};

pub use model_onnx::OnnxSequenceClassifier;

/// Label returned whenever the model cannot produce a prediction.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Values per hand in a feature row.
pub const HAND_FEATURES: usize = HAND_LANDMARKS * 3;
/// Right hand then left hand.
pub const NUM_FEATURES: usize = HAND_FEATURES * 2;
pub const DEFAULT_SEQUENCE_LENGTH: usize = 30;

/// An opaque trained classifier over `(sequence_length, num_features)` input.
pub trait SequenceClassifier: Send + Sync {
    /// One score per class, in class-name order.
    fn predict(&self, sequence: ArrayView2<f32>) -> Result<Vec<f32>, ModelError>;
}

/// Sidecar file written next to the model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,
    #[serde(default = "default_num_features")]
    pub num_features: usize,
    pub class_names: Vec<String>,
}

fn default_sequence_length() -> usize {
    DEFAULT_SEQUENCE_LENGTH
}

fn default_num_features() -> usize {
    NUM_FEATURES
}

impl ModelMetadata {
    pub fn new(class_names: Vec<String>) -> ModelMetadata {
        ModelMetadata {
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            num_features: NUM_FEATURES,
            class_names,
        }
    }

    pub fn from_path(path: &Path) -> Result<ModelMetadata, ModelError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequencePrediction {
    pub label: String,
    pub confidence: f32,
    /// Full distribution, empty on fallback.
    pub probabilities: Vec<f32>,
}

impl SequencePrediction {
    pub fn unknown() -> SequencePrediction {
        SequencePrediction {
            label: UNKNOWN_LABEL.to_string(),
            confidence: 0.0,
            probabilities: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

/// Flatten a frame buffer into the classifier input.
///
/// Each row is the right hand's 63 coordinates followed by the left hand's,
/// with a missing hand left as zeros. Only the newest `sequence_length`
/// frames are kept, and a short buffer is padded by repeating its last row.
/// An empty buffer gives all zeros.
pub fn build_sequence_tensor(frames: &[Frame], sequence_length: usize) -> Array2<f32> {
    let mut tensor = Array2::<f32>::zeros((sequence_length, NUM_FEATURES));
    let start = frames.len().saturating_sub(sequence_length);
    let recent = &frames[start..];

    for (mut row, frame) in tensor.rows_mut().into_iter().zip(recent) {
        if let Some(hand) = &frame.right_hand {
            for (dst, src) in row.iter_mut().take(HAND_FEATURES).zip(hand.flatten()) {
                *dst = src;
            }
        }
        if let Some(hand) = &frame.left_hand {
            for (dst, src) in row.iter_mut().skip(HAND_FEATURES).zip(hand.flatten()) {
                *dst = src;
            }
        }
    }

    if !recent.is_empty() && recent.len() < sequence_length {
        let last = tensor.row(recent.len() - 1).to_owned();
        for mut row in tensor.rows_mut().into_iter().skip(recent.len()) {
            row.assign(&last);
        }
    }
    tensor
}

/// Readiness-tracking wrapper shared by every session.
///
/// `predict` never fails: any problem is logged and reported as
/// `("Unknown", 0.0)`.
#[derive(Clone)]
pub struct SequenceModel {
    classifier: Option<Arc<dyn SequenceClassifier>>,
    class_names: Vec<String>,
    sequence_length: usize,
}

impl Default for SequenceModel {
    fn default() -> Self {
        SequenceModel::unloaded()
    }
}

impl std::fmt::Debug for SequenceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceModel")
            .field("loaded", &self.is_loaded())
            .field("class_names", &self.class_names)
            .field("sequence_length", &self.sequence_length)
            .finish()
    }
}

impl SequenceModel {
    pub fn unloaded() -> SequenceModel {
        SequenceModel {
            classifier: None,
            class_names: Vec::new(),
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
        }
    }

    pub fn with_classifier(
        classifier: Arc<dyn SequenceClassifier>,
        class_names: Vec<String>,
        sequence_length: usize,
    ) -> SequenceModel {
        SequenceModel {
            classifier: Some(classifier),
            class_names,
            sequence_length,
        }
    }

    /// Load an ONNX artifact. Returns the readiness flag; on failure the
    /// adapter stays unloaded and the cause is logged.
    pub fn load(&mut self, model_path: &Path, class_names: Vec<String>) -> bool {
        match OnnxSequenceClassifier::from_file(model_path, self.sequence_length) {
            Ok(classifier) => {
                debug!(path = %model_path.display(), classes = class_names.len(), "sequence model loaded");
                self.classifier = Some(Arc::new(classifier));
                self.class_names = class_names;
                true
            }
            Err(err) => {
                warn!(path = %model_path.display(), %err, "sequence model unavailable");
                self.classifier = None;
                false
            }
        }
    }

    /// Load an artifact together with its metadata sidecar.
    pub fn load_with_metadata(&mut self, model_path: &Path, metadata_path: &Path) -> bool {
        match ModelMetadata::from_path(metadata_path) {
            Ok(metadata) => {
                self.sequence_length = metadata.sequence_length;
                self.load(model_path, metadata.class_names)
            }
            Err(err) => {
                warn!(path = %metadata_path.display(), %err, "model metadata unavailable");
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Rows the classifier expects. A metadata sidecar overrides this.
    pub fn set_sequence_length(&mut self, sequence_length: usize) {
        self.sequence_length = sequence_length.max(1);
    }

    pub fn predict(&self, frames: &[Frame]) -> SequencePrediction {
        match self.try_predict(frames) {
            Ok(prediction) => prediction,
            Err(err) => {
                warn!(%err, "sequence model prediction failed");
                SequencePrediction::unknown()
            }
        }
    }

    fn try_predict(&self, frames: &[Frame]) -> Result<SequencePrediction, ModelError> {
        let classifier = self.classifier.as_ref().ok_or(ModelError::NotLoaded)?;
        if frames.is_empty() {
            return Ok(SequencePrediction::unknown());
        }

        let tensor = build_sequence_tensor(frames, self.sequence_length);
        let scores = classifier.predict(tensor.view())?;
        if scores.is_empty() {
            return Err(ModelError::EmptyOutput);
        }
        if scores.len() != self.class_names.len() {
            return Err(ModelError::ClassCountMismatch {
                outputs: scores.len(),
                classes: self.class_names.len(),
            });
        }

        let probabilities = softmax_if_needed(scores);
        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        Ok(SequencePrediction {
            label: self.class_names[index].clone(),
            confidence: confidence.clamp(0.0, 1.0),
            probabilities,
        })
    }
}

// Raw logits are turned into a distribution; an existing distribution is kept.
fn softmax_if_needed(scores: Vec<f32>) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let is_distribution = scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    if is_distribution {
        return scores;
    }
    let max = scores.iter().copied().fold(f32::MIN, f32::max);
    let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Hand;
    use crate::synthetic::{synthetic_frames, synthetic_hand, DemoShape, Trajectory};

    struct FixedClassifier(Vec<f32>);

    impl SequenceClassifier for FixedClassifier {
        fn predict(&self, sequence: ArrayView2<f32>) -> Result<Vec<f32>, ModelError> {
            assert_eq!(sequence.dim(), (DEFAULT_SEQUENCE_LENGTH, NUM_FEATURES));
            Ok(self.0.clone())
        }
    }

    fn make_model(scores: Vec<f32>, classes: &[&str]) -> SequenceModel {
        SequenceModel::with_classifier(
            Arc::new(FixedClassifier(scores)),
            classes.iter().map(|c| c.to_string()).collect(),
            DEFAULT_SEQUENCE_LENGTH,
        )
    }

    #[test]
    fn test_unloaded_returns_unknown() {
        let model = SequenceModel::unloaded();
        assert!(!model.is_loaded());
        let frames = synthetic_frames(DemoShape::Open, Trajectory::Hold, 10, (0.5, 0.5));
        let prediction = model.predict(&frames);
        assert_eq!(prediction.label, "Unknown");
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn test_empty_buffer_returns_unknown() {
        let model = make_model(vec![0.1, 0.9], &["A", "B"]);
        assert!(model.predict(&[]).is_unknown());
    }

    #[test]
    fn test_argmax_maps_to_class_name() {
        let model = make_model(vec![0.1, 0.7, 0.2], &["HELLO", "THANKS", "YES"]);
        let frames = synthetic_frames(DemoShape::Open, Trajectory::Wave, 12, (0.5, 0.5));
        let prediction = model.predict(&frames);
        assert_eq!(prediction.label, "THANKS");
        assert!((prediction.confidence - 0.7).abs() < 1e-6);
        assert_eq!(prediction.probabilities.len(), 3);
    }

    #[test]
    fn test_logits_are_normalised() {
        let model = make_model(vec![2.0, -1.0], &["A", "B"]);
        let frames = synthetic_frames(DemoShape::Fist, Trajectory::Hold, 5, (0.5, 0.5));
        let prediction = model.predict(&frames);
        assert_eq!(prediction.label, "A");
        let sum: f32 = prediction.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_class_count_mismatch_falls_back() {
        let model = make_model(vec![0.5, 0.5], &["ONLY"]);
        let frames = synthetic_frames(DemoShape::Fist, Trajectory::Hold, 5, (0.5, 0.5));
        assert!(model.predict(&frames).is_unknown());
    }

    #[test]
    fn test_missing_artifact_stays_unloaded() {
        let mut model = SequenceModel::unloaded();
        assert!(!model.load(Path::new("/nonexistent/model.onnx"), vec!["A".into()]));
        assert!(!model.is_loaded());
    }

    #[test]
    fn test_tensor_layout_and_padding() {
        let right = Hand::from_points(&synthetic_hand(DemoShape::Open, (0.5, 0.5))).unwrap();
        let frames = vec![
            Frame {
                right_hand: Some(right.clone()),
                ..Default::default()
            },
            Frame {
                left_hand: Some(right.clone()),
                ..Default::default()
            },
        ];
        let tensor = build_sequence_tensor(&frames, 4);
        assert_eq!(tensor.dim(), (4, 126));
        assert_eq!(tensor[[0, 0]], 0.5);
        assert_eq!(tensor[[0, 63]], 0.0);
        assert_eq!(tensor[[1, 0]], 0.0);
        assert_eq!(tensor[[1, 63]], 0.5);
        // rows past the buffer repeat the last frame
        assert_eq!(tensor.row(3), tensor.row(1));
    }

    #[test]
    fn test_tensor_keeps_newest_frames() {
        let frames = synthetic_frames(DemoShape::Open, Trajectory::Wave, 40, (0.5, 0.5));
        let tensor = build_sequence_tensor(&frames, 30);
        let newest = frames[39].right_hand.as_ref().unwrap().wrist();
        assert_eq!(tensor[[29, 0]], newest.x);
        let oldest = frames[10].right_hand.as_ref().unwrap().wrist();
        assert_eq!(tensor[[0, 0]], oldest.x);
    }

    #[test]
    fn test_empty_tensor_is_zero() {
        let tensor = build_sequence_tensor(&[], 30);
        assert!(tensor.iter().all(|v| *v == 0.0));
    }
}
