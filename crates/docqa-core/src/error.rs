use docqa_llm::LlmError;
use docqa_memory::IndexError;
use docqa_memory::document::DocumentError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unsupported file type: {0} (expected pdf or txt)")]
    UnsupportedFileType(String),

    #[error(transparent)]
    Document(DocumentError),

    #[error("index rebuild aborted: {0}")]
    IndexLocked(String),

    #[error("embedding failed: {0}")]
    Embedding(LlmError),

    #[error("provider {0} cannot produce embeddings")]
    EmbeddingUnsupported(String),

    #[error("generation failed: {0}")]
    Generation(LlmError),

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("document contains no text to index")]
    EmptyDocument,

    #[error("no document indexed yet, upload one first")]
    NoIndex,

    #[error("another operation is in progress")]
    Busy,

    #[error(transparent)]
    Index(IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Map a model-call failure, keeping timeouts and cancellation distinct.
    pub(crate) fn from_embedding(e: LlmError) -> Self {
        match e {
            LlmError::Timeout { seconds } => Self::Timeout {
                operation: "embedding",
                seconds,
            },
            LlmError::Cancelled => Self::Cancelled,
            other => Self::Embedding(other),
        }
    }

    pub(crate) fn from_generation(e: LlmError) -> Self {
        match e {
            LlmError::Timeout { seconds } => Self::Timeout {
                operation: "generation",
                seconds,
            },
            LlmError::Cancelled => Self::Cancelled,
            other => Self::Generation(other),
        }
    }
}

impl From<DocumentError> for SessionError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Embedding(inner) => Self::from_embedding(inner),
            other => Self::Document(other),
        }
    }
}

impl From<IndexError> for SessionError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Locked(reason) => Self::IndexLocked(reason),
            other => Self::Index(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_timeout_maps_to_timeout() {
        let err = SessionError::from(DocumentError::Embedding(LlmError::Timeout { seconds: 30 }));
        assert!(matches!(
            err,
            SessionError::Timeout {
                operation: "embedding",
                seconds: 30
            }
        ));
        assert_eq!(err.to_string(), "embedding timed out after 30s");
    }

    #[test]
    fn generation_cancel_maps_to_cancelled() {
        let err = SessionError::from_generation(LlmError::Cancelled);
        assert!(matches!(err, SessionError::Cancelled));
    }

    #[test]
    fn locked_index_maps_to_index_locked() {
        let err = SessionError::from(IndexError::Locked("index.lock exists".into()));
        assert!(matches!(err, SessionError::IndexLocked(ref r) if r == "index.lock exists"));
    }

    #[test]
    fn other_llm_errors_are_wrapped() {
        let err = SessionError::from_generation(LlmError::Other("down".into()));
        assert_eq!(err.to_string(), "generation failed: down");
    }
}
