pub mod artifact;
pub mod handle;
#[cfg(feature = "onnx")]
pub mod onnx;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pipeline::FeatureTensor;

pub use handle::ClassifierHandle;

/// Batched genre inference.
///
/// `predict` receives every segment of one clip at once and must return one
/// probability vector per tensor, in input order, each in genre order.
pub trait Classifier: Send + Sync {
    fn predict(&self, batch: &[FeatureTensor]) -> Result<Vec<Vec<f32>>>;
}

/// Load the configured model artifact into a classifier.
#[cfg(feature = "onnx")]
pub fn load_classifier(model: &str) -> Result<Arc<dyn Classifier>> {
    let path = artifact::resolve_model_path(model)
        .map_err(|e| Error::ClassifierUnavailable(format!("{:#}", e)))?;
    let classifier = onnx::OnnxClassifier::load(&path)?;
    Ok(Arc::new(classifier))
}

#[cfg(not(feature = "onnx"))]
pub fn load_classifier(model: &str) -> Result<Arc<dyn Classifier>> {
    let _ = artifact::resolve_model_path(model)
        .map_err(|e| Error::ClassifierUnavailable(format!("{:#}", e)))?;
    Err(Error::ClassifierUnavailable(
        "model inference requires the 'onnx' feature. \
         Rebuild with: cargo build --features onnx"
            .to_string(),
    ))
}

/// Handle that loads `model` on first use.
pub fn lazy_handle(model: String) -> ClassifierHandle {
    ClassifierHandle::new(move || load_classifier(&model))
}
