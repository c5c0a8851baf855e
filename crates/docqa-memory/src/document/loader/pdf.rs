use std::path::Path;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata, LoadFuture,
};

pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for PdfLoader {
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
            let pages = tokio::task::spawn_blocking(move || extract_pages(&path))
                .await
                .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

            tracing::debug!(%source, pages = pages.len(), "loaded PDF document");

            Ok(pages
                .into_iter()
                .zip(1u32..)
                .map(|(content, page)| Document {
                    content,
                    metadata: DocumentMetadata::new(source.clone(), "application/pdf")
                        .with_page(page),
                })
                .collect())
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

/// Extract text page by page. Parser panics on malformed input are reported as errors.
fn extract_pages(path: &Path) -> Result<Vec<String>, DocumentError> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(path)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(DocumentError::Pdf(e.to_string())),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            tracing::warn!(path = %path.display(), "PDF parser panicked: {msg}");
            Err(DocumentError::Pdf(format!("parser panicked: {msg}")))
        }
    }
}
