//! Persisting an uploaded file into the session directory.

use std::path::{Path, PathBuf};

use crate::error::SessionError;

/// Extensions accepted for upload, lowercase.
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["pdf", "txt"];

/// An uploaded file as received from the front-end.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, using its file name as the declared name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn from_path(path: &Path) -> Result<Self, SessionError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { name, bytes })
    }
}

/// Return the lowercase extension of `name` if it is accepted.
///
/// The extension is the text after the last `.`.
///
/// # Errors
///
/// Returns [`SessionError::UnsupportedFileType`] for any other extension.
pub fn validate_extension(name: &str) -> Result<String, SessionError> {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| SessionError::UnsupportedFileType(name.to_owned()))?;

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(SessionError::UnsupportedFileType(ext))
    }
}

/// Write the upload to `<dir>/uploaded.<ext>`, replacing any earlier upload.
///
/// # Errors
///
/// Returns an error if the extension is rejected or the write fails.
pub async fn save_upload(dir: &Path, file: &UploadedFile) -> Result<PathBuf, SessionError> {
    let ext = validate_extension(&file.name)?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("uploaded.{ext}"));
    tokio::fs::write(&path, &file.bytes).await?;
    tracing::debug!(path = %path.display(), bytes = file.bytes.len(), "upload saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_pdf_and_txt_case_insensitively() {
        assert_eq!(validate_extension("report.pdf").unwrap(), "pdf");
        assert_eq!(validate_extension("Report.PDF").unwrap(), "pdf");
        assert_eq!(validate_extension("notes.v2.txt").unwrap(), "txt");
    }

    #[test]
    fn rejects_other_extensions() {
        assert!(matches!(
            validate_extension("x.docx"),
            Err(SessionError::UnsupportedFileType(ref e)) if e == "docx"
        ));
        assert!(matches!(
            validate_extension("archive.pdf.zip"),
            Err(SessionError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn rejects_missing_extension() {
        assert!(matches!(
            validate_extension("README"),
            Err(SessionError::UnsupportedFileType(_))
        ));
    }

    #[tokio::test]
    async fn rejected_upload_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = UploadedFile::new("x.docx", b"PK\x03\x04".to_vec());

        assert!(save_upload(dir.path(), &file).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn save_overwrites_previous_upload() {
        let dir = tempfile::tempdir().unwrap();

        let first = save_upload(dir.path(), &UploadedFile::new("a.txt", b"one".to_vec()))
            .await
            .unwrap();
        let second = save_upload(dir.path(), &UploadedFile::new("b.TXT", b"two".to_vec()))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second, dir.path().join("uploaded.txt"));
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn from_path_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let file = UploadedFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "paper.pdf");
        assert_eq!(file.bytes, b"%PDF");
    }

    mod proptest_extension {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn allowed_extension_any_case(stem in "[a-zA-Z0-9_ -]{1,20}", upper in any::<bool>(), pdf in any::<bool>()) {
                let ext = if pdf { "pdf" } else { "txt" };
                let ext = if upper { ext.to_ascii_uppercase() } else { ext.to_owned() };
                let accepted = validate_extension(&format!("{stem}.{ext}")).unwrap();
                prop_assert_eq!(accepted, ext.to_ascii_lowercase());
            }

            #[test]
            fn other_extensions_rejected(stem in "[a-z]{1,10}", ext in "[a-z]{1,5}") {
                prop_assume!(ext != "pdf" && ext != "txt");
                let is_unsupported = matches!(
                    validate_extension(&format!("{stem}.{ext}")),
                    Err(SessionError::UnsupportedFileType(_))
                );
                prop_assert!(is_unsupported);
            }
        }
    }
}
