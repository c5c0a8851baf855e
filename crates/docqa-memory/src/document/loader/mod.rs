#[cfg(feature = "pdf")]
mod pdf;
mod text;

#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use text::TextLoader;

use super::{DocumentError, DocumentLoader};

/// Pick the loader for a lowercase or mixed-case file extension.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedFormat`] if no loader handles `ext`.
pub fn loader_for_extension(
    ext: &str,
    max_file_size: u64,
) -> Result<Box<dyn DocumentLoader>, DocumentError> {
    let ext = ext.to_ascii_lowercase();
    #[cfg(feature = "pdf")]
    if ext == "pdf" {
        return Ok(Box::new(PdfLoader { max_file_size }));
    }
    let text = TextLoader { max_file_size };
    if text.supported_extensions().contains(&ext.as_str()) {
        return Ok(Box::new(text));
    }
    Err(DocumentError::UnsupportedFormat(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DEFAULT_MAX_FILE_SIZE;

    #[test]
    fn dispatches_text_case_insensitively() {
        let loader = loader_for_extension("TXT", DEFAULT_MAX_FILE_SIZE).unwrap();
        assert!(loader.supported_extensions().contains(&"txt"));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn dispatches_pdf() {
        let loader = loader_for_extension("pdf", DEFAULT_MAX_FILE_SIZE).unwrap();
        assert_eq!(loader.supported_extensions(), &["pdf"]);
    }

    #[test]
    fn unknown_extension_rejected() {
        let err = loader_for_extension("docx", DEFAULT_MAX_FILE_SIZE)
            .err()
            .unwrap();
        assert!(matches!(err, DocumentError::UnsupportedFormat(ref e) if e == "docx"));
    }
}
