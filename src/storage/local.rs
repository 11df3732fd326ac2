//! Local filesystem storage implementation.
//!
//! Every write goes to a temporary file first and is renamed into place, so
//! a reader never observes a half-written PDF.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::services::AssembledDocument;
use crate::storage::{DocumentStorage, Manifest};
use crate::utils::url::sanitize_file_name;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Folder for a group, stripped of path-hazardous characters.
    fn group_dir(&self, group: &str) -> Result<PathBuf> {
        let folder = sanitize_file_name(group);
        if folder.is_empty() || folder == "." || folder == ".." {
            return Err(AppError::validation(format!(
                "group name {group:?} does not yield a usable folder name"
            )));
        }
        Ok(self.root_dir.join(folder))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStorage for LocalStorage {
    async fn write_document(&self, group: &str, document: &AssembledDocument) -> Result<PathBuf> {
        let path = self.group_dir(group)?.join(&document.filename);
        self.write_bytes(&path, &document.bytes).await?;
        log::info!(
            "Wrote {} ({} pages, {} bytes)",
            path.display(),
            document.pages,
            document.bytes.len()
        );
        Ok(path)
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        let path = self.root_dir.join("manifest.json");
        let bytes = serde_json::to_vec_pretty(manifest)?;
        self.write_bytes(&path, &bytes).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QualityTier;
    use crate::storage::ManifestEntry;

    fn document(filename: &str) -> AssembledDocument {
        AssembledDocument {
            bytes: b"%PDF-1.5 test".to_vec(),
            filename: filename.to_string(),
            pages: 1,
            skipped: vec![],
        }
    }

    #[tokio::test]
    async fn test_write_document_into_group_folder() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let path = storage
            .write_document("Week 1: Basics", &document("Week 1 Basics-Intro.pdf"))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("Week 1 Basics").join("Week 1 Basics-Intro.pdf"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.5 test");
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write_document("G", &document("a.pdf")).await.unwrap();
        let mut second = document("a.pdf");
        second.bytes = b"second".to_vec();
        let path = storage.write_document("G", &second).await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_rejects_unusable_group_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(storage.write_document("???", &document("a.pdf")).await.is_err());
        assert!(storage.write_document("..", &document("a.pdf")).await.is_err());
    }

    #[tokio::test]
    async fn test_write_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let mut manifest = Manifest::new(QualityTier::High);
        manifest.documents.push(ManifestEntry {
            group: "G".into(),
            lesson: "L".into(),
            file: "G/G-L.pdf".into(),
            pages: 3,
            skipped: vec!["4.jpg".into()],
        });
        let path = storage.write_manifest(&manifest).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(path).await.unwrap()).unwrap();
        assert_eq!(json["quality"], "480p");
        assert_eq!(json["documents"][0]["pages"], 3);
        assert_eq!(manifest.page_count(), 3);
    }
}
