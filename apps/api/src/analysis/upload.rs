//! Upload validation and temp-file spooling.
//!
//! `SpooledUpload` is an RAII guard: the spooled file is removed when the
//! guard drops, so every exit path of the workflow cleans up.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::errors::AppError;

/// Hard upload cap. A file of exactly this size is accepted.
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

/// Lowercased extension after the last dot, if any.
pub fn extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        _ => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    }
}

/// Rejects anything that must not reach the scoring oracle: wrong extension
/// or oversized payload. Returns the lowercased extension on success.
pub fn validate(file_name: &str, size: usize) -> Result<String, AppError> {
    let ext = extension(file_name).ok_or_else(|| {
        AppError::UnsupportedFile("Tipo de arquivo não suportado. Use PDF, DOC ou DOCX.".to_string())
    })?;

    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AppError::UnsupportedFile(
            "Tipo de arquivo não suportado. Use PDF, DOC ou DOCX.".to_string(),
        ));
    }

    if size > MAX_FILE_SIZE {
        return Err(AppError::UnsupportedFile(
            "O arquivo excede o tamanho máximo de 5MB".to_string(),
        ));
    }

    Ok(ext)
}

/// A validated upload spooled to disk under the configured upload dir.
pub struct SpooledUpload {
    path: PathBuf,
    file_name: String,
    size: usize,
    mime_type: &'static str,
}

impl SpooledUpload {
    /// Validates and writes the upload to `<upload_dir>/<uuid>.<ext>`.
    pub async fn spool(
        upload_dir: &Path,
        file_name: &str,
        data: &[u8],
    ) -> Result<Self, AppError> {
        let ext = validate(file_name, data.len())?;

        tokio::fs::create_dir_all(upload_dir)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        let path = upload_dir.join(format!("{}.{ext}", Uuid::new_v4()));
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            path,
            file_name: file_name.to_string(),
            size: data.len(),
            mime_type: mime_for_extension(&ext),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    /// Reads the spooled bytes back for submission to the oracle.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, AppError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| AppError::Internal(e.into()))
    }
}

impl Drop for SpooledUpload {
    fn drop(&mut self) {
        // Removal failure is logged and swallowed: cleanup must never turn a
        // completed analysis into an error.
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove spooled upload {:?}: {e}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_file_at_exact_size_limit() {
        assert!(validate("cv.pdf", MAX_FILE_SIZE).is_ok());
    }

    #[test]
    fn rejects_file_one_byte_over_limit() {
        let err = validate("cv.pdf", MAX_FILE_SIZE + 1).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFile(_)));
    }

    #[test]
    fn rejects_unsupported_extension_regardless_of_size() {
        let err = validate("cv.txt", 10).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFile(_)));
    }

    #[test]
    fn rejects_file_without_extension() {
        assert!(validate("curriculo", 10).is_err());
        assert!(validate("curriculo.", 10).is_err());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert_eq!(validate("CV.PDF", 10).unwrap(), "pdf");
        assert_eq!(validate("resume.DocX", 10).unwrap(), "docx");
    }

    #[test]
    fn mime_types_follow_extension() {
        assert_eq!(mime_for_extension("pdf"), "application/pdf");
        assert_eq!(mime_for_extension("doc"), "application/msword");
        assert!(mime_for_extension("docx").contains("openxmlformats"));
    }

    #[tokio::test]
    async fn spooled_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let upload = SpooledUpload::spool(dir.path(), "cv.pdf", b"%PDF-1.4 test")
                .await
                .unwrap();
            assert_eq!(upload.size(), 13);
            assert_eq!(upload.read_bytes().await.unwrap(), b"%PDF-1.4 test");
            upload.path.clone()
        };
        assert!(!path.exists());
    }
}
