use candle_core::Device;
use pylate_rs::ColBERT;
use tracing::{debug, info};

use crate::{
    embedding::{Embedder, QUERY_PREFIX, l2_normalize},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";

/// Texts encoded per model call.
const ENCODE_BATCH_SIZE: usize = 32;

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

fn embedding_error(e: impl std::fmt::Display) -> Error {
    Error::Embedding(e.to_string())
}

/// Lazily loaded ColBERT model producing one pooled vector per text.
///
/// Token embeddings are summed over the sequence and scaled to unit length,
/// which gives the same direction as mean pooling.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::with_model_id(DEFAULT_MODEL_ID.to_string())
    }
}

impl ModelManager {
    /// The model is not loaded until the first call to
    /// [`Embedder::embed`].
    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: None,
            model_id,
        }
    }

    /// Returns `true` if the model has already been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Ensures the model is loaded, downloading from HuggingFace Hub if needed.
    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        if self.model.is_none() {
            info!(model = %self.model_id, "loading embedding model");
            let colbert: ColBERT = ColBERT::from(&self.model_id)
                .with_device(default_device())
                .try_into()
                .map_err(embedding_error)?;
            self.model = Some(colbert);
        }

        self.model
            .as_mut()
            .ok_or_else(|| Error::Embedding("model failed to load".into()))
    }

    fn encode_batch(
        &mut self,
        texts: &[String],
        is_query: bool,
    ) -> Result<Vec<Vec<f32>>> {
        let model = self.ensure_loaded()?;
        // [batch, tokens, dim] -> [batch, dim]
        let pooled = model
            .encode(texts, is_query)
            .map_err(embedding_error)?
            .sum(1)
            .map_err(embedding_error)?
            .to_vec2::<f32>()
            .map_err(embedding_error)?;

        Ok(pooled
            .into_iter()
            .map(|mut v| {
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

/// Query texts are recognised by their prefix.
fn is_query_batch(texts: &[String]) -> bool {
    !texts.is_empty() && texts.iter().all(|t| t.starts_with(QUERY_PREFIX))
}

impl Embedder for ModelManager {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let is_query = is_query_batch(texts);
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(ENCODE_BATCH_SIZE) {
            vectors.extend(self.encode_batch(batch, is_query)?);
            debug!(done = vectors.len(), total = texts.len(), "encoded batch");
        }

        Ok(vectors)
    }
}
