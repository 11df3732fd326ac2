// src/models/mod.rs

//! Domain models for the scraper.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod lesson;
mod quality;
mod session;

// Re-export all public types
pub use config::{
    AssemblerConfig, Config, FetcherConfig, HttpConfig, SiteSelectors, VideoConfig,
};
pub use lesson::{GroupResult, ImageDescriptor, LessonItem, ScrapeResult};
pub use quality::QualityTier;
pub use session::{Progress, ScrapeMode, Stage, Status};

/// Post-extraction filters applied to lesson items.
///
/// Items that fail a filter are dropped from the result, but their pages are
/// still fetched and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFilters {
    pub only_with_video: bool,
    pub only_with_images: bool,
}

impl ItemFilters {
    /// Filters used by the link sweep: video lessons, with or without images.
    pub fn video_only() -> Self {
        Self {
            only_with_video: true,
            only_with_images: false,
        }
    }

    pub fn admits(&self, has_video: bool, material_count: usize) -> bool {
        if self.only_with_video && !has_video {
            return false;
        }
        if self.only_with_images && material_count == 0 {
            return false;
        }
        true
    }
}

impl Default for ItemFilters {
    fn default() -> Self {
        Self {
            only_with_video: false,
            only_with_images: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_require_images() {
        let filters = ItemFilters::default();
        assert!(filters.admits(false, 2));
        assert!(!filters.admits(true, 0));
    }

    #[test]
    fn test_video_only_filters() {
        let filters = ItemFilters::video_only();
        assert!(filters.admits(true, 0));
        assert!(!filters.admits(false, 3));
    }

    #[test]
    fn test_combined_filters_require_both() {
        let filters = ItemFilters {
            only_with_video: true,
            only_with_images: true,
        };
        assert!(filters.admits(true, 1));
        assert!(!filters.admits(true, 0));
        assert!(!filters.admits(false, 1));
    }
}
