//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Lesson page and image metadata fetching
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// CSS selectors for the course site markup
    #[serde(default)]
    pub selectors: SiteSelectors,

    /// Streaming video discovery
    #[serde(default)]
    pub video: VideoConfig,

    /// Document assembly settings
    #[serde(default)]
    pub assembler: AssemblerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if let Some(base) = &self.http.base_url {
            url::Url::parse(base)
                .map_err(|e| AppError::validation(format!("http.base_url is invalid: {e}")))?;
        }
        if self.fetcher.page_concurrency == 0 {
            return Err(AppError::validation("fetcher.page_concurrency must be > 0"));
        }
        if self.fetcher.image_concurrency == 0 {
            return Err(AppError::validation(
                "fetcher.image_concurrency must be > 0",
            ));
        }
        if self.fetcher.cache_ttl_minutes == 0 {
            return Err(AppError::validation("fetcher.cache_ttl_minutes must be > 0"));
        }
        if self.assembler.fetch_timeout_secs == 0 {
            return Err(AppError::validation(
                "assembler.fetch_timeout_secs must be > 0",
            ));
        }
        if self.assembler.batch_size == 0 || self.assembler.group_chunk == 0 {
            return Err(AppError::validation(
                "assembler.batch_size and assembler.group_chunk must be > 0",
            ));
        }
        if self.assembler.sweep_concurrency == 0 {
            return Err(AppError::validation(
                "assembler.sweep_concurrency must be > 0",
            ));
        }
        if self.video.cdn_host.trim().is_empty() {
            return Err(AppError::validation("video.cdn_host is empty"));
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Base URL for relative lesson and image links.
    /// Falls back to the origin of the scraped page.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            base_url: None,
        }
    }
}

/// Lesson fetching behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Maximum concurrent lesson page fetches
    #[serde(default = "defaults::page_concurrency")]
    pub page_concurrency: usize,

    /// Maximum concurrent image metadata requests per page
    #[serde(default = "defaults::image_concurrency")]
    pub image_concurrency: usize,

    /// Lifetime of cached upstream responses
    #[serde(default = "defaults::cache_ttl_minutes")]
    pub cache_ttl_minutes: u64,

    /// Path pattern used to derive a stable lesson id (`:name` marks the id)
    #[serde(default = "defaults::link_id_pattern")]
    pub link_id_pattern: String,
}

impl FetcherConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            page_concurrency: defaults::page_concurrency(),
            image_concurrency: defaults::image_concurrency(),
            cache_ttl_minutes: defaults::cache_ttl_minutes(),
            link_id_pattern: defaults::link_id_pattern(),
        }
    }
}

/// CSS selectors describing the course site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSelectors {
    /// Element holding a group (course section) title
    #[serde(default = "defaults::group_title")]
    pub group_title: String,

    /// Closest ancestor of the group title that precedes the lesson block
    #[serde(default = "defaults::group_row")]
    pub group_row: String,

    /// Sibling block following the row that lists the lessons
    #[serde(default = "defaults::lesson_block")]
    pub lesson_block: String,

    /// Lesson link rows inside the lesson block
    #[serde(default = "defaults::lesson_link")]
    pub lesson_link: String,

    /// Attribute of the lesson link row carrying the URL
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,

    /// Lesson title on a lesson page
    #[serde(default = "defaults::lesson_title")]
    pub lesson_title: String,

    /// Material (image) anchors on a lesson page
    #[serde(default = "defaults::material_link")]
    pub material_link: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            group_title: defaults::group_title(),
            group_row: defaults::group_row(),
            lesson_block: defaults::lesson_block(),
            lesson_link: defaults::lesson_link(),
            link_attr: defaults::link_attr(),
            lesson_title: defaults::lesson_title(),
            material_link: defaults::material_link(),
        }
    }
}

/// Streaming video discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// CDN host serving manifests for script-declared asset ids
    #[serde(default = "defaults::cdn_host")]
    pub cdn_host: String,

    /// Manifest file name appended to the asset id
    #[serde(default = "defaults::manifest_name")]
    pub manifest_name: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            cdn_host: defaults::cdn_host(),
            manifest_name: defaults::manifest_name(),
        }
    }
}

/// Document assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Timeout for a single image download
    #[serde(default = "defaults::fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Images fetched concurrently while assembling one document
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Selected groups materialized concurrently
    #[serde(default = "defaults::group_chunk")]
    pub group_chunk: usize,

    /// Concurrent batches during a link sweep
    #[serde(default = "defaults::sweep_concurrency")]
    pub sweep_concurrency: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: defaults::fetch_timeout(),
            batch_size: defaults::batch_size(),
            group_chunk: defaults::group_chunk(),
            sweep_concurrency: defaults::sweep_concurrency(),
        }
    }
}

mod defaults {
    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; lesson-scraper/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Fetcher defaults
    pub fn page_concurrency() -> usize {
        10
    }
    pub fn image_concurrency() -> usize {
        30
    }
    pub fn cache_ttl_minutes() -> u64 {
        30
    }
    pub fn link_id_pattern() -> String {
        "/web/lection/:linkId/show_lection".into()
    }

    // Selector defaults
    pub fn group_title() -> String {
        ".course_title_text".into()
    }
    pub fn group_row() -> String {
        ".row".into()
    }
    pub fn lesson_block() -> String {
        ".lection_main_block".into()
    }
    pub fn lesson_link() -> String {
        "tr.lection_link".into()
    }
    pub fn link_attr() -> String {
        "data-link".into()
    }
    pub fn lesson_title() -> String {
        ".lection_title".into()
    }
    pub fn material_link() -> String {
        ".material_main a".into()
    }

    // Video defaults
    pub fn cdn_host() -> String {
        "vz-be550dce-c8c.b-cdn.net".into()
    }
    pub fn manifest_name() -> String {
        "playlist.m3u8".into()
    }

    // Assembler defaults
    pub fn fetch_timeout() -> u64 {
        30
    }
    pub fn batch_size() -> usize {
        4
    }
    pub fn group_chunk() -> usize {
        2
    }
    pub fn sweep_concurrency() -> usize {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.fetcher.page_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fetcher.image_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.http.base_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [fetcher]
            page_concurrency = 3

            [video]
            cdn_host = "cdn.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.fetcher.page_concurrency, 3);
        assert_eq!(config.fetcher.image_concurrency, 30);
        assert_eq!(config.fetcher.cache_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(config.video.cdn_host, "cdn.example.com");
        assert_eq!(config.video.manifest_name, "playlist.m3u8");
        assert_eq!(config.selectors.lesson_link, "tr.lection_link");
    }

    #[test]
    fn load_or_default_falls_back() {
        let config = Config::load_or_default("/nonexistent/lesson-scraper.toml");
        assert_eq!(config.assembler.batch_size, 4);
    }
}
