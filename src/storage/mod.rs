//! Storage abstractions for assembled documents.
//!
//! ## Directory Structure
//!
//! ```text
//! {root}/
//! ├── manifest.json         # What was written, with page and skip counts
//! ├── Week 1/
//! │   ├── Week 1-Intro.pdf
//! │   └── Week 1-Cells.pdf
//! └── Week 2/
//!     └── Week 2-Tissues.pdf
//! ```

pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::QualityTier;
use crate::services::AssembledDocument;

// Re-export for convenience
pub use local::LocalStorage;

/// One stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub group: String,
    pub lesson: String,
    /// Path relative to the storage root
    pub file: String,
    pub pages: usize,
    pub skipped: Vec<String>,
}

/// Summary of one materialization run, written next to the documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub quality: QualityTier,
    pub documents: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(quality: QualityTier) -> Self {
        Self {
            generated_at: Utc::now(),
            quality,
            documents: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.documents.iter().map(|d| d.pages).sum()
    }
}

/// Trait for document storage backends.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Store a document under its group and return where it landed.
    async fn write_document(&self, group: &str, document: &AssembledDocument) -> Result<PathBuf>;

    /// Store the run manifest.
    async fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf>;
}
