//! On-device model inference embedding provider.
//!
//! [`OnDeviceEmbeddingProvider`] feeds text to a loaded [`InferenceModel`]
//! and converts the output tensor to a normalized `f32` vector, whatever the
//! tensor's native element type.
//!
//! The model runtime itself is injected: an ONNX session, a Core ML model
//! bridged over FFI, or a test double all fit behind [`InferenceModel`].
//!
//! # Example
//!
//! ```rust,ignore
//! use buddy_rag::ondevice::{ModelLoader, OnDeviceEmbeddingProvider};
//!
//! let provider = OnDeviceEmbeddingProvider::load(&my_loader, "models/minilm.onnx")?;
//! let embedding = provider.embed("monthly grocery budget").await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{RagError, Result};

const PROVIDER: &str = "OnDevice";

/// Text used to verify a model at construction time.
const WARMUP_TEXT: &str = "warm-up";

/// The raw output buffer of one inference call.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTensor {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int32(Vec<i32>),
}

impl OutputTensor {
    /// Number of elements in the tensor.
    pub fn len(&self) -> usize {
        match self {
            OutputTensor::Float32(v) => v.len(),
            OutputTensor::Float64(v) => v.len(),
            OutputTensor::Int32(v) => v.len(),
        }
    }

    /// Whether the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert every element to `f32`.
    pub fn into_f32(self) -> Vec<f32> {
        match self {
            OutputTensor::Float32(v) => v,
            OutputTensor::Float64(v) => v.into_iter().map(|x| x as f32).collect(),
            OutputTensor::Int32(v) => v.into_iter().map(|x| x as f32).collect(),
        }
    }
}

/// A loaded sentence-embedding model.
///
/// `infer` is synchronous and may be CPU-heavy; the provider always calls it
/// from a blocking task.
pub trait InferenceModel: Send + Sync {
    /// Run the model on one input text.
    fn infer(&self, text: &str) -> Result<OutputTensor>;

    /// Length of the output tensor.
    fn output_dimensions(&self) -> usize;
}

/// Loads an [`InferenceModel`] from a model file.
pub trait ModelLoader {
    /// Load the model stored at `path`.
    fn load(&self, path: &Path) -> Result<Arc<dyn InferenceModel>>;
}

/// An [`EmbeddingProvider`] backed by a local inference model.
#[derive(Clone)]
pub struct OnDeviceEmbeddingProvider {
    model: Arc<dyn InferenceModel>,
    dimensions: usize,
}

impl std::fmt::Debug for OnDeviceEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDeviceEmbeddingProvider").field("dimensions", &self.dimensions).finish()
    }
}

impl OnDeviceEmbeddingProvider {
    /// Wrap an already loaded model.
    ///
    /// The model runs one warm-up inference so that a broken model fails here rather
    /// than on the first real request.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the model reports zero output
    /// dimensions or the warm-up inference fails or has the wrong length.
    pub fn new(model: Arc<dyn InferenceModel>) -> Result<Self> {
        let dimensions = model.output_dimensions();
        if dimensions == 0 {
            return Err(RagError::model_load(PROVIDER, "model reports zero output dimensions"));
        }

        let warmup = model
            .infer(WARMUP_TEXT)
            .map_err(|e| RagError::model_load(PROVIDER, format!("warm-up inference failed: {e}")))?;
        if warmup.len() != dimensions {
            return Err(RagError::model_load(
                PROVIDER,
                format!("warm-up output has {} elements, model declares {dimensions}", warmup.len()),
            ));
        }

        info!(provider = PROVIDER, dimensions, "on-device model ready");
        Ok(Self { model, dimensions })
    }

    /// Load a model file through `loader` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the file does not exist, the loader
    /// fails, or the loaded model fails its warm-up inference.
    pub fn load(loader: &dyn ModelLoader, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RagError::model_load(
                PROVIDER,
                format!("model file not found: {}", path.display()),
            ));
        }
        let model = loader.load(path).map_err(|e| match e {
            RagError::ModelLoad { .. } => e,
            other => RagError::model_load(PROVIDER, other.to_string()),
        })?;
        Self::new(model)
    }
}

fn run_model(model: &dyn InferenceModel, dimensions: usize, text: &str) -> Result<Vec<f32>> {
    let tensor = model.infer(text)?;
    if tensor.len() != dimensions {
        return Err(RagError::embedding(
            PROVIDER,
            format!("model returned {} elements, expected {dimensions}", tensor.len()),
        ));
    }
    let mut v = tensor.into_f32();
    l2_normalize(&mut v);
    Ok(v)
}

#[async_trait]
impl EmbeddingProvider for OnDeviceEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text]).await?;
        results.pop().ok_or_else(|| RagError::embedding(PROVIDER, "model returned no output"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let model = Arc::clone(&self.model);
        let dimensions = self.dimensions;
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || {
            owned.iter().map(|t| run_model(model.as_ref(), dimensions, t)).collect()
        })
        .await
        .map_err(|e| {
            error!(provider = PROVIDER, error = %e, "inference task failed");
            RagError::embedding(PROVIDER, format!("inference task failed: {e}"))
        })?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::is_normalized;

    /// Hashes bytes into a fixed-size tensor of the configured element type.
    struct HashModel {
        dims: usize,
        kind: &'static str,
    }

    impl InferenceModel for HashModel {
        fn infer(&self, text: &str) -> Result<OutputTensor> {
            let seed = text.bytes().fold(7u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
            let raw: Vec<i32> =
                (0..self.dims).map(|i| ((seed.wrapping_add(i as u32 * 17)) % 97) as i32 + 1).collect();
            Ok(match self.kind {
                "f64" => OutputTensor::Float64(raw.iter().map(|x| *x as f64).collect()),
                "i32" => OutputTensor::Int32(raw),
                _ => OutputTensor::Float32(raw.iter().map(|x| *x as f32).collect()),
            })
        }

        fn output_dimensions(&self) -> usize {
            self.dims
        }
    }

    struct BrokenModel;

    impl InferenceModel for BrokenModel {
        fn infer(&self, _text: &str) -> Result<OutputTensor> {
            Ok(OutputTensor::Float32(vec![1.0]))
        }

        fn output_dimensions(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn converts_every_tensor_type_to_the_same_vector() {
        let mut outputs = Vec::new();
        for kind in ["f32", "f64", "i32"] {
            let provider =
                OnDeviceEmbeddingProvider::new(Arc::new(HashModel { dims: 16, kind })).unwrap();
            let v = provider.embed("hello world").await.unwrap();
            assert_eq!(v.len(), 16);
            assert!(is_normalized(&v, 1e-5));
            outputs.push(v);
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[1], outputs[2]);
    }

    #[tokio::test]
    async fn repeated_embeddings_are_identical() {
        let provider =
            OnDeviceEmbeddingProvider::new(Arc::new(HashModel { dims: 8, kind: "f32" })).unwrap();
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn output_length_mismatch_fails_at_construction() {
        let err = OnDeviceEmbeddingProvider::new(Arc::new(BrokenModel)).unwrap_err();
        assert!(matches!(err, RagError::ModelLoad { .. }));
    }

    #[test]
    fn missing_model_file_fails_before_loading() {
        struct PanicLoader;
        impl ModelLoader for PanicLoader {
            fn load(&self, _path: &Path) -> Result<Arc<dyn InferenceModel>> {
                panic!("loader must not be called for a missing file");
            }
        }
        let err = OnDeviceEmbeddingProvider::load(&PanicLoader, "/nonexistent/model.onnx")
            .unwrap_err();
        assert!(matches!(err, RagError::ModelLoad { .. }));
    }
}
