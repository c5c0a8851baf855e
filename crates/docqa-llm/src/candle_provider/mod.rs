//! Local sentence embeddings through Candle.

pub mod embed;

pub use candle_core::Device;

use std::sync::Arc;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

use self::embed::EmbedModel;

/// Default sentence-transformers model used for chunk and question embeddings.
pub const DEFAULT_EMBEDDING_REPO: &str = "sentence-transformers/all-MiniLM-L12-v2";

/// Embedding-only provider backed by a BERT model loaded from the Hugging Face hub.
#[derive(Clone)]
pub struct CandleEmbedder {
    model: Arc<EmbedModel>,
    repo_id: String,
    device: Device,
}

impl std::fmt::Debug for CandleEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbedder")
            .field("repo_id", &self.repo_id)
            .field("device", &format!("{:?}", self.device))
            .finish_non_exhaustive()
    }
}

impl CandleEmbedder {
    /// Download (or reuse the cached copy of) `repo_id` and load it on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if download or model initialization fails.
    pub fn load(repo_id: &str, device: Device) -> Result<Self, LlmError> {
        let model = EmbedModel::load(repo_id, &device)?;
        tracing::info!(repo_id, device = ?device, "candle embedding model loaded");
        Ok(Self {
            model: Arc::new(model),
            repo_id: repo_id.to_owned(),
            device,
        })
    }

    #[must_use]
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    #[must_use]
    pub fn device_name(&self) -> &'static str {
        match &self.device {
            Device::Cpu => "cpu",
            Device::Cuda(_) => "cuda",
            Device::Metal(_) => "metal",
        }
    }
}

impl LlmProvider for CandleEmbedder {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Err(LlmError::ChatUnsupported { provider: "candle" })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = Arc::clone(&self.model);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || model.embed_sync(&text))
            .await
            .map_err(|e| LlmError::Inference(format!("candle embedding task failed: {e}")))?
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "candle"
    }
}

/// Resolve a device name from config into a Candle device.
///
/// # Errors
///
/// Returns an error if the requested accelerator is not available.
pub fn select_device(name: &str) -> Result<Device, LlmError> {
    match name {
        "cpu" | "" => Ok(Device::Cpu),
        #[cfg(feature = "cuda")]
        "cuda" => Ok(Device::new_cuda(0)?),
        #[cfg(feature = "metal")]
        "metal" => Ok(Device::new_metal(0)?),
        other => Err(LlmError::ModelLoad(format!(
            "device '{other}' is not available in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_device_cpu() {
        assert!(matches!(select_device("cpu").unwrap(), Device::Cpu));
        assert!(matches!(select_device("").unwrap(), Device::Cpu));
    }

    #[test]
    fn select_device_unknown_errors() {
        assert!(select_device("tpu").is_err());
    }

    #[tokio::test]
    #[ignore = "downloads all-MiniLM-L12-v2 from the Hugging Face hub"]
    async fn embeds_are_normalized_and_deterministic() {
        let embedder = CandleEmbedder::load(DEFAULT_EMBEDDING_REPO, Device::Cpu).unwrap();
        let a = embedder.embed("The capital of France is Paris.").await.unwrap();
        let b = embedder.embed("The capital of France is Paris.").await.unwrap();
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
