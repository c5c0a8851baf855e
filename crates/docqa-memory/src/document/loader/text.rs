use std::path::Path;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata, LoadFuture,
};

pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> LoadFuture<'_> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = tokio::fs::canonicalize(&path).await?;

            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge(meta.len()));
            }

            let source = path.display().to_string();
            let bytes = tokio::fs::read(&path).await?;
            let content = String::from_utf8(bytes).map_err(|e| DocumentError::Decode {
                path: source.clone(),
                source: e,
            })?;

            tracing::debug!(%source, chars = content.chars().count(), "loaded text document");

            Ok(vec![Document {
                content,
                metadata: DocumentMetadata::new(source, "text/plain"),
            }])
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt"]
    }
}
