//! Local storage for files uploaded with assistants

use crate::infrastructure::settings::Settings;
use di::{Ref, inject, injectable};
use log::info;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const UPLOAD_DIR: &str = "files";

pub struct MediaStorage {
    root: PathBuf,
}

#[injectable]
impl MediaStorage {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> MediaStorage {
        MediaStorage::new(settings.media_root.clone())
    }
}

impl MediaStorage {
    pub fn new(root: PathBuf) -> MediaStorage {
        MediaStorage { root }
    }

    /// Writes `bytes` under the media root and returns the stored reference,
    /// relative to the root.
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> std::io::Result<String> {
        let reference = format!(
            "{UPLOAD_DIR}/{}_{}",
            &Uuid::new_v4().simple().to_string()[..8],
            sanitize_file_name(file_name)
        );
        let path = self.root.join(&reference);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        info!("stored upload {} ({} bytes)", path.display(), bytes.len());

        Ok(reference)
    }

    pub fn path_of(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }

    /// Deletes a stored upload. A file that is already gone is not an error.
    pub async fn remove(&self, reference: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.path_of(reference)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Keeps only the final path component and replaces anything unusual.
fn sanitize_file_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_owned()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my report.pdf"), "my_report.pdf");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[tokio::test]
    async fn test_save_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path().to_path_buf());

        let reference = storage.save("faq.txt", b"hello").await.unwrap();

        assert!(reference.starts_with("files/"));
        assert!(reference.ends_with("_faq.txt"));
        let written = tokio::fs::read(storage.path_of(&reference)).await.unwrap();
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn test_remove_deletes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path().to_path_buf());
        let reference = storage.save("faq.txt", b"hello").await.unwrap();

        storage.remove(&reference).await.unwrap();
        assert!(!storage.path_of(&reference).exists());

        // second removal is a no-op
        storage.remove(&reference).await.unwrap();
    }
}
