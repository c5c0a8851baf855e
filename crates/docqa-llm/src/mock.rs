//! Test-only mock provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::provider::{LlmProvider, Message};

/// Dimension of the bag-of-words vectors produced by [`MockProvider::embed`].
pub const MOCK_EMBEDDING_DIM: usize = 64;

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    /// Reply with the last user message instead of `default_response`.
    pub echo_prompt: bool,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
    embed_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    last_prompt: Arc<Mutex<Option<String>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            echo_prompt: false,
            supports_embeddings: true,
            fail_chat: false,
            fail_embed: false,
            delay_ms: 0,
            embed_calls: Arc::new(AtomicUsize::new(0)),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            last_prompt: Arc::new(Mutex::new(None)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn echoing() -> Self {
        Self {
            echo_prompt: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_embeddings() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    /// A chat-only provider that reports no embedding support.
    #[must_use]
    pub fn chat_only() -> Self {
        Self {
            supports_embeddings: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// Content of the last user message passed to `chat`.
    #[must_use]
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

/// Deterministic hashed bag-of-words embedding, L2-normalized.
#[must_use]
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; MOCK_EMBEDDING_DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.to_lowercase().bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        #[expect(clippy::cast_possible_truncation)]
        let slot = (hash % MOCK_EMBEDDING_DIM as u64) as usize;
        vector[slot] += 1.0;
    }
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, crate::LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let prompt = messages.last().map(|m| m.content.clone());
        *self.last_prompt.lock().unwrap() = prompt.clone();
        if self.fail_chat {
            return Err(crate::LlmError::Other("mock LLM error".into()));
        }
        if self.echo_prompt {
            return Ok(prompt.unwrap_or_default());
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_embed {
            return Err(crate::LlmError::Other("mock embedding error".into()));
        }
        if !self.supports_embeddings {
            return Err(crate::LlmError::EmbedUnsupported { provider: "mock" });
        }
        Ok(bag_of_words(text))
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_of_words_is_deterministic_and_normalized() {
        let a = bag_of_words("The capital of France is Paris.");
        let b = bag_of_words("the CAPITAL of france is paris");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn bag_of_words_empty_text_is_zero_vector() {
        assert!(bag_of_words("  ...  ").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn scripted_responses_then_default() {
        let mock = MockProvider::with_responses(vec!["first".into()]);
        assert_eq!(mock.chat(&[Message::user("q")]).await.unwrap(), "first");
        assert_eq!(mock.chat(&[Message::user("q")]).await.unwrap(), "mock response");
        assert_eq!(mock.chat_calls(), 2);
    }

    #[tokio::test]
    async fn echo_returns_prompt() {
        let mock = MockProvider::echoing();
        let reply = mock.chat(&[Message::user("context: Paris")]).await.unwrap();
        assert_eq!(reply, "context: Paris");
        assert_eq!(mock.last_prompt().as_deref(), Some("context: Paris"));
    }

    #[tokio::test]
    async fn embed_counts_calls_across_clones() {
        let mock = MockProvider::default();
        let clone = mock.clone();
        clone.embed("a").await.unwrap();
        mock.embed("b").await.unwrap();
        assert_eq!(mock.embed_calls(), 2);
    }

    #[tokio::test]
    async fn failing_variants_error() {
        assert!(MockProvider::failing().chat(&[]).await.is_err());
        assert!(MockProvider::failing_embeddings().embed("x").await.is_err());
    }
}
