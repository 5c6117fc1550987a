use super::validation::{content_type_for, extension, sanitize_filename};
use crate::error::Result;
use log::{debug, warn};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// A client upload held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    /// File name as supplied by the client
    pub file_name: String,
    /// Declared content type
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads a local file, inferring the content type from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = content_type_for(&file_name);
        Ok(Self::new(file_name, content_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Sanitized file name used in logs and audit records
    pub fn safe_name(&self) -> String {
        sanitize_filename(&self.file_name)
    }
}

/// Upload content written to a temporary file
///
/// The file is removed when the value is dropped, on success and error
/// paths alike.
#[derive(Debug)]
pub struct StagedUpload {
    file: Option<NamedTempFile>,
}

impl StagedUpload {
    /// Writes `upload` to a fresh temporary file keeping its extension
    pub fn stage(upload: &Upload) -> Result<Self> {
        let suffix = extension(&upload.file_name)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_else(|| ".tmp".to_string());
        let mut file = tempfile::Builder::new()
            .prefix("retinascope-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&upload.bytes)?;
        file.flush()?;
        debug!(
            "Staged {} ({} bytes) at {}",
            upload.safe_name(),
            upload.size(),
            file.path().display()
        );
        Ok(Self { file: Some(file) })
    }

    pub fn path(&self) -> &Path {
        match &self.file {
            Some(file) => file.path(),
            None => Path::new(""),
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!("Failed to remove staged upload {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staged_file_removed_on_drop() {
        let upload = Upload::new("scan.dcm", "application/dicom", vec![1, 2, 3]);
        let staged = StagedUpload::stage(&upload).unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(path.extension().unwrap(), "dcm");
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_staged_file_removed_on_error_path() {
        fn failing(upload: &Upload) -> Result<std::path::PathBuf> {
            let staged = StagedUpload::stage(upload)?;
            let path = staged.path().to_path_buf();
            Err(crate::error::RetinaError::Validation(path.display().to_string()))
        }
        let upload = Upload::new("x", "application/octet-stream", vec![0; 8]);
        match failing(&upload) {
            Err(crate::error::RetinaError::Validation(path)) => {
                assert!(path.ends_with(".tmp"));
                assert!(!Path::new(&path).exists());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_upload_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fundus photo.JPG");
        fs::write(&path, b"jpeg-ish").unwrap();
        let upload = Upload::from_path(&path).unwrap();
        assert_eq!(upload.content_type, "image/jpeg");
        assert_eq!(upload.size(), 8);
        assert_eq!(upload.safe_name(), "fundus_photo.JPG");
    }
}
