//! Embedding and generation provider abstraction with Ollama and Candle backends.

pub mod any;
#[cfg(feature = "candle")]
pub mod candle_provider;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use error::LlmError;
pub use provider::LlmProvider;
