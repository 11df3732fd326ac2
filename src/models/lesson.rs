//! Lesson, image, and group result structures.

use serde::{Deserialize, Serialize};

use crate::utils::url::ordering_token;

/// Outcome of resolving one image on a lesson page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// File name; its trailing digits order pages in a document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageDescriptor {
    pub fn resolved(url: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            success: true,
            url: Some(url.into()),
            name: Some(name.into()),
            size: Some(size),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Numeric ordering token embedded in `name`, 0 when absent.
    pub fn order(&self) -> u64 {
        self.name.as_deref().map(ordering_token).unwrap_or(0)
    }
}

/// A lesson discovered in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonItem {
    pub title: String,
    pub images: Vec<ImageDescriptor>,
    pub has_video: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub full_link: String,
}

impl LessonItem {
    /// Sum of the known image sizes in bytes.
    pub fn total_size(&self) -> u64 {
        self.images.iter().filter_map(|i| i.size).sum()
    }
}

/// Processed lessons for one named group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResult {
    pub name: String,
    pub items: Vec<LessonItem>,
}

impl GroupResult {
    pub fn find(&self, title: &str) -> Option<&LessonItem> {
        self.items.iter().find(|item| item.title == title)
    }
}

/// Groups in page order, as produced by a scrape run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub groups: Vec<GroupResult>,
}

impl ScrapeResult {
    pub fn group(&self, name: &str) -> Option<&GroupResult> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    /// Insert a group, replacing an earlier result with the same name in place.
    pub fn upsert(&mut self, group: GroupResult) {
        match self.groups.iter_mut().find(|g| g.name == group.name) {
            Some(existing) => *existing = group,
            None => self.groups.push(group),
        }
    }

    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.groups
            .iter()
            .flat_map(|g| &g.items)
            .map(LessonItem::total_size)
            .sum()
    }
}
