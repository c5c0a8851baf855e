#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("{path} is not valid UTF-8: {source}")]
    Decode {
        path: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[cfg(feature = "pdf")]
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("invalid splitter config: {0}")]
    InvalidConfig(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] docqa_llm::LlmError),
}
