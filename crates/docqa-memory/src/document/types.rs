use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    pub content_type: String,
    /// 1-based page number for paged formats.
    pub page: Option<u32>,
    pub extra: HashMap<String, String>,
}

impl DocumentMetadata {
    #[must_use]
    pub fn new(source: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content_type: content_type.into(),
            page: None,
            extra: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Position of this chunk within its source document.
    pub chunk_index: usize,
    /// Character offset of the chunk start inside the source document.
    pub start: usize,
}
