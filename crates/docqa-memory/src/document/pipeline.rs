use docqa_llm::provider::EmbedFuture;

use super::{Chunk, Document, DocumentError, TextSplitter};

pub type EmbedFn = Box<dyn Fn(&str) -> EmbedFuture + Send + Sync>;

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

pub struct IngestionPipeline {
    splitter: TextSplitter,
    embed_fn: EmbedFn,
}

impl IngestionPipeline {
    pub fn new(splitter: TextSplitter, embed_fn: EmbedFn) -> Self {
        Self { splitter, embed_fn }
    }

    /// Split all records into chunks, preserving record order.
    #[must_use]
    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        self.splitter.split_all(documents)
    }

    /// Embed chunks one at a time, in order. The first failure aborts the batch.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Embedding`] if any embedding call fails.
    pub async fn embed(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>, DocumentError> {
        let total = chunks.len();
        let mut embedded = Vec::with_capacity(total);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let embedding = (self.embed_fn)(&chunk.content).await?;
            tracing::trace!(chunk = i + 1, total, "embedded chunk");
            embedded.push(EmbeddedChunk { chunk, embedding });
        }
        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::document::splitter::SplitterConfig;
    use crate::document::types::DocumentMetadata;

    fn make_document(content: &str) -> Document {
        Document {
            content: content.to_string(),
            metadata: DocumentMetadata::new("test", "text/plain"),
        }
    }

    fn counting_embed(calls: Arc<AtomicUsize>) -> EmbedFn {
        Box::new(move |text: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            let len = text.chars().count() as f32;
            Box::pin(async move { Ok(vec![len, 1.0]) })
        })
    }

    fn error_embed() -> EmbedFn {
        Box::new(|_text: &str| {
            Box::pin(async move { Err(docqa_llm::LlmError::Other("mock embed error".into())) })
        })
    }

    #[tokio::test]
    async fn empty_document_embeds_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = IngestionPipeline::new(
            TextSplitter::new(SplitterConfig::default()),
            counting_embed(Arc::clone(&calls)),
        );

        let chunks = pipeline.split(&[make_document("")]);
        let embedded = pipeline.embed(chunks).await.unwrap();
        assert!(embedded.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embeds_every_chunk_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = IngestionPipeline::new(
            TextSplitter::new(SplitterConfig::default()),
            counting_embed(Arc::clone(&calls)),
        );

        let chunks = pipeline.split(&[make_document(&"a".repeat(1000))]);
        assert_eq!(chunks.len(), 3);
        let embedded = pipeline.embed(chunks).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(embedded[0].embedding, vec![500.0, 1.0]);
        assert_eq!(embedded[2].chunk.chunk_index, 2);
    }

    #[tokio::test]
    async fn embedding_error_propagates() {
        let pipeline =
            IngestionPipeline::new(TextSplitter::new(SplitterConfig::default()), error_embed());

        let chunks = pipeline.split(&[make_document("hello world")]);
        let result = pipeline.embed(chunks).await;
        assert!(matches!(result, Err(DocumentError::Embedding(_))));
    }
}
