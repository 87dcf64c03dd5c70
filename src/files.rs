//! Resolution of local file references into uploadable content.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// A file ready to be sent to AI Studio.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Where file references handed to the task API are looked up.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn open(&self, file_id: &str) -> Result<LocalFile>;
}

/// Serves files from a directory; file ids are paths relative to it.
pub struct DirectoryFileSource {
    root: PathBuf,
}

impl DirectoryFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, file_id: &str) -> Result<PathBuf> {
        let relative = Path::new(file_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if file_id.is_empty() || escapes {
            return Err(Error::Upload {
                file_id: file_id.to_string(),
                reason: "file reference must stay inside the files directory".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileSource for DirectoryFileSource {
    async fn open(&self, file_id: &str) -> Result<LocalFile> {
        let path = self.resolve(file_id)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| Error::Upload {
            file_id: file_id.to_string(),
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_id.to_string());
        Ok(LocalFile {
            content_type: content_type_for(&name).to_string(),
            name,
            bytes,
        })
    }
}

fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "md" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"%PDF-1.7").unwrap();

        let source = DirectoryFileSource::new(dir.path());
        let file = source.open("report.pdf").await.unwrap();
        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryFileSource::new(dir.path());
        let err = source.open("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, Error::Upload { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_an_upload_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryFileSource::new(dir.path());
        let err = source.open("nope.txt").await.unwrap_err();
        assert!(matches!(err, Error::Upload { file_id, .. } if file_id == "nope.txt"));
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(content_type_for("blob.bin"), "application/octet-stream");
        assert_eq!(content_type_for("NOTES.TXT"), "text/plain");
    }
}
