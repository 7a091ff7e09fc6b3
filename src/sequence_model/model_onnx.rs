use std::path::Path;

use ndarray::{ArrayView2, Axis, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{Environment, ExecutionProvider, GraphOptimizationLevel, Session, SessionBuilder, Value};

use super::{SequenceClassifier, NUM_FEATURES};
use crate::error::ModelError;

/// ONNX sequence classifier. Input `(1, sequence_length, 126)`, first output
/// is the per-class score vector.
pub struct OnnxSequenceClassifier {
    session: Session,
    sequence_length: usize,
}

impl OnnxSequenceClassifier {
    pub fn from_file(path: &Path, sequence_length: usize) -> Result<OnnxSequenceClassifier, ModelError> {
        if !path.is_file() {
            return Err(ModelError::MissingArtifact(path.to_path_buf()));
        }

        let environment = Environment::builder()
            .with_name("silentvoice")
            .with_execution_providers([ExecutionProvider::CPU(Default::default())])
            .build()?
            .into_arc();

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level1)?
            .with_intra_threads(1)?
            .with_model_from_file(path)?;

        Ok(OnnxSequenceClassifier {
            session,
            sequence_length,
        })
    }
}

impl SequenceClassifier for OnnxSequenceClassifier {
    fn predict(&self, sequence: ArrayView2<f32>) -> Result<Vec<f32>, ModelError> {
        let expected = (self.sequence_length, NUM_FEATURES);
        if sequence.dim() != expected {
            return Err(ModelError::ShapeMismatch {
                expected,
                found: sequence.dim(),
            });
        }

        // add the batch axis
        let array: CowArray<f32, _> = sequence.view().insert_axis(Axis(0)).into_dyn().into();
        let inputs = vec![Value::from_array(self.session.allocator(), &array)?];
        let outputs = self.session.run(inputs)?;

        let output = outputs.first().ok_or(ModelError::EmptyOutput)?;
        let scores: OrtOwnedTensor<f32, _> = output.try_extract()?;
        let scores: Vec<f32> = scores.view().iter().copied().collect();
        Ok(scores)
    }
}
