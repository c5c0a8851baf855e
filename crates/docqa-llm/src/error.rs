#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: &'static str },

    #[error("text generation not supported by {provider}")]
    ChatUnsupported { provider: &'static str },

    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("request cancelled")]
    Cancelled,

    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[cfg(feature = "candle")]
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
