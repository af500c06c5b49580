//! ONNX Runtime backend for the genre classifier.
//!
//! Expects a single float input shaped `[batch, 128, 130, 1]` and a first
//! output shaped `[batch, 10]` holding softmax probabilities.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;

use super::Classifier;
use crate::error::{Error, Result};
use crate::pipeline::aggregate::Genre;
use crate::pipeline::FeatureTensor;

pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl OnnxClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ClassifierUnavailable(format!(
                "Model not found at {}",
                path.display()
            )));
        }

        log::info!("Loading model from {}...", path.display());
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(num_threads()))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| Error::ClassifierUnavailable(format!("failed to load {}: {}", path.display(), e)))?;

        for input in &session.inputs {
            log::info!("Model input '{}': {:?}", input.name, input.input_type);
        }

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

fn num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Classifier for OnnxClassifier {
    fn predict(&self, batch: &[FeatureTensor]) -> Result<Vec<Vec<f32>>> {
        let Some(first) = batch.first() else {
            return Ok(Vec::new());
        };
        let [mels, frames, channels] = first.shape();
        if let Some(odd) = batch.iter().find(|t| t.shape() != first.shape()) {
            return Err(Error::processing(format!(
                "mixed tensor shapes in batch: {:?} vs {:?}",
                first.shape(),
                odd.shape()
            )));
        }

        let mut flat = Vec::with_capacity(batch.len() * mels * frames * channels);
        for tensor in batch {
            flat.extend_from_slice(tensor.values());
        }

        let input = Tensor::from_array(([batch.len(), mels, frames, channels], flat))
            .map_err(|e| Error::processing(format!("input tensor error: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::processing("classifier session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| Error::processing(format!("inference failed: {}", e)))?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::processing(format!("output extraction failed: {}", e)))?;

        let classes = Genre::ALL.len();
        if data.len() != batch.len() * classes {
            return Err(Error::processing(format!(
                "model produced {} values for {} segments x {} genres",
                data.len(),
                batch.len(),
                classes
            )));
        }

        Ok(data.chunks(classes).map(|c| c.to_vec()).collect())
    }
}
