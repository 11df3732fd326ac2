// src/services/video.rs

//! Video URL discovery on lesson pages.
//!
//! Each strategy inspects a parsed page independently. `VideoExtractor`
//! evaluates them in a fixed order and returns the first URL found:
//!
//! 1. asset id declared in an inline script, mapped to the CDN manifest
//! 2. `<video src>` (blob URLs ignored)
//! 3. `<video><source src>`
//! 4. any `.m3u8` URL in the raw markup
//! 5. any direct media file URL (`.mp4`, `.webm`, `.mov`, `.m4v`) in the raw markup

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::VideoConfig;
use crate::utils::url::resolve;

/// A parsed lesson page together with its raw markup and address.
pub struct PageView<'a> {
    pub url: &'a str,
    pub raw: &'a str,
    pub document: &'a Html,
}

impl<'a> PageView<'a> {
    pub fn new(url: &'a str, raw: &'a str, document: &'a Html) -> Self {
        Self { url, raw, document }
    }
}

/// One independent way of finding a video URL.
pub trait VideoStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, page: &PageView<'_>) -> Option<String>;
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::config(format!("invalid pattern {pattern}: {e}")))
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Asset id declared by a player script, e.g. `videoId: "<uuid>"` or an
/// embed URL of the form `mediadelivery.net/embed/<library>/<uuid>`.
pub struct ScriptAssetId {
    scripts: Selector,
    pattern: Regex,
    cdn_host: String,
    manifest_name: String,
}

impl ScriptAssetId {
    const UUID: &'static str = r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

    pub fn new(config: &VideoConfig) -> Result<Self> {
        let pattern = format!(
            r#"(?:mediadelivery\.net/(?:embed|play)/\d+/({uuid}))|(?:(?:videoId|video_id|guid)["']?\s*[:=]\s*["']({uuid})["'])"#,
            uuid = Self::UUID
        );
        Ok(Self {
            scripts: parse_selector("script")?,
            pattern: compile(&pattern)?,
            cdn_host: config.cdn_host.clone(),
            manifest_name: config.manifest_name.clone(),
        })
    }

    fn asset_id(&self, text: &str) -> Option<String> {
        let caps = self.pattern.captures(text)?;
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_lowercase())
    }
}

impl VideoStrategy for ScriptAssetId {
    fn name(&self) -> &'static str {
        "script-asset-id"
    }

    fn extract(&self, page: &PageView<'_>) -> Option<String> {
        page.document
            .select(&self.scripts)
            .find_map(|script| self.asset_id(&script.text().collect::<String>()))
            .map(|id| format!("https://{}/{}/{}", self.cdn_host, id, self.manifest_name))
    }
}

/// Resolve a media attribute against the page, keeping the raw value when
/// it cannot be joined.
fn media_url(page: &PageView<'_>, src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("blob:") {
        return None;
    }
    Some(resolve(page.url, src).unwrap_or_else(|| src.to_string()))
}

/// `src` attribute of a `<video>` element.
pub struct VideoElementSrc {
    selector: Selector,
}

impl VideoElementSrc {
    pub fn new() -> Result<Self> {
        Ok(Self {
            selector: parse_selector("video[src]")?,
        })
    }
}

impl VideoStrategy for VideoElementSrc {
    fn name(&self) -> &'static str {
        "video-src"
    }

    fn extract(&self, page: &PageView<'_>) -> Option<String> {
        page.document
            .select(&self.selector)
            .filter_map(|video| video.value().attr("src"))
            .find_map(|src| media_url(page, src))
    }
}

/// `src` attribute of a `<source>` nested in a `<video>` element.
pub struct VideoSourceSrc {
    selector: Selector,
}

impl VideoSourceSrc {
    pub fn new() -> Result<Self> {
        Ok(Self {
            selector: parse_selector("video source[src]")?,
        })
    }
}

impl VideoStrategy for VideoSourceSrc {
    fn name(&self) -> &'static str {
        "video-source"
    }

    fn extract(&self, page: &PageView<'_>) -> Option<String> {
        page.document
            .select(&self.selector)
            .filter_map(|source| source.value().attr("src"))
            .find_map(|src| media_url(page, src))
    }
}

/// First absolute URL in the raw markup matching a pattern.
pub struct RawUrl {
    name: &'static str,
    pattern: Regex,
}

impl RawUrl {
    /// Streaming manifest (`.m3u8`).
    pub fn manifest() -> Result<Self> {
        Ok(Self {
            name: "raw-manifest",
            pattern: compile(r#"(?i)https?://[^\s"'<>\\]+?\.m3u8(?:\?[^\s"'<>\\]*)?"#)?,
        })
    }

    /// Direct media file.
    pub fn media_file() -> Result<Self> {
        Ok(Self {
            name: "raw-media-file",
            pattern: compile(
                r#"(?i)https?://[^\s"'<>\\]+?\.(?:mp4|webm|mov|m4v)(?:\?[^\s"'<>\\]*)?"#,
            )?,
        })
    }
}

impl VideoStrategy for RawUrl {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract(&self, page: &PageView<'_>) -> Option<String> {
        self.pattern
            .find(page.raw)
            .map(|m| m.as_str().to_string())
    }
}

/// Ordered list of video strategies.
pub struct VideoExtractor {
    strategies: Vec<Box<dyn VideoStrategy>>,
}

impl VideoExtractor {
    /// Default strategy order.
    pub fn new(config: &VideoConfig) -> Result<Self> {
        Ok(Self::with_strategies(vec![
            Box::new(ScriptAssetId::new(config)?),
            Box::new(VideoElementSrc::new()?),
            Box::new(VideoSourceSrc::new()?),
            Box::new(RawUrl::manifest()?),
            Box::new(RawUrl::media_file()?),
        ]))
    }

    pub fn with_strategies(strategies: Vec<Box<dyn VideoStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First URL produced by a strategy, in order.
    pub fn extract(&self, page: &PageView<'_>) -> Option<String> {
        self.strategies.iter().find_map(|strategy| {
            let url = strategy.extract(page)?;
            log::debug!("Video found by {} on {}: {}", strategy.name(), page.url, url);
            Some(url)
        })
    }
}
