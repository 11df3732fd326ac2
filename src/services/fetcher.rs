// src/services/fetcher.rs

//! Bounded two-level fetch of a group's lesson pages.
//!
//! Lesson pages are fetched through the page cache with an outer
//! concurrency bound; each page's material links are then sized with HEAD
//! requests through the size cache. HEAD requests of every page in the group
//! share one pool of `image_concurrency` permits. Both levels use ordered
//! buffering, so results keep link order and href order no matter which
//! request finishes first.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::cache::FetchCache;
use crate::error::{AppError, Result};
use crate::models::{FetcherConfig, ImageDescriptor, ItemFilters, LessonItem, ScrapeMode};
use crate::services::extract::{LessonMarkup, MarkupExtractor};
use crate::services::selection::GroupSelection;
use crate::utils::http::{Transport, with_cancel};
use crate::utils::url::{file_name, link_id, resolve};

/// How one group should be processed.
#[derive(Debug, Clone, Default)]
pub struct GroupRequest {
    pub mode: ScrapeMode,
    /// Selection snapshot for the group; consulted in download mode only
    pub selection: Option<GroupSelection>,
    pub filters: ItemFilters,
}

/// Items produced for one group plus counters of what was left out.
#[derive(Debug, Default)]
pub struct GroupOutcome {
    pub items: Vec<LessonItem>,
    pub link_total: usize,
    pub item_failures: usize,
    /// Not selected in download mode
    pub skipped: usize,
    /// Rejected by item filters
    pub filtered: usize,
}

enum LinkOutcome {
    Item(LessonItem),
    Skipped,
    Filtered,
}

/// Fetches and extracts lesson pages with bounded concurrency.
pub struct BoundedFetcher {
    transport: Arc<dyn Transport>,
    cache: Arc<FetchCache>,
    extractor: Arc<MarkupExtractor>,
    config: FetcherConfig,
    /// Base for material hrefs; each lesson page's own URL when unset
    base_url: Option<String>,
}

impl BoundedFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<FetchCache>,
        extractor: Arc<MarkupExtractor>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            extractor,
            config,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Process every lesson link of a group.
    ///
    /// Per-item failures are counted and logged; only cancellation aborts
    /// the group.
    pub async fn process_group(
        &self,
        group: &str,
        links: &[String],
        request: &GroupRequest,
        cancel: &CancellationToken,
    ) -> Result<GroupOutcome> {
        let mut outcome = GroupOutcome {
            link_total: links.len(),
            ..GroupOutcome::default()
        };

        let image_pool = Semaphore::new(self.config.image_concurrency.max(1));
        let image_pool = &image_pool;
        let mut pages = stream::iter(links.iter().cloned())
            .map(|link| async move {
                let result = self.process_link(&link, request, cancel, image_pool).await;
                (link, result)
            })
            .buffered(self.config.page_concurrency.max(1));

        while let Some((link, result)) = pages.next().await {
            match result {
                Ok(LinkOutcome::Item(item)) => outcome.items.push(item),
                Ok(LinkOutcome::Skipped) => outcome.skipped += 1,
                Ok(LinkOutcome::Filtered) => outcome.filtered += 1,
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    outcome.item_failures += 1;
                    log::warn!("[{group}] Failed to process lesson {link}: {error}");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        log::debug!(
            "[{}] {} items from {} links ({} failed, {} skipped, {} filtered)",
            group,
            outcome.items.len(),
            outcome.link_total,
            outcome.item_failures,
            outcome.skipped,
            outcome.filtered
        );
        Ok(outcome)
    }

    /// Lesson page markup, through the page cache.
    async fn fetch_page(&self, link: &str, cancel: &CancellationToken) -> Result<String> {
        let key = link_id(link, &self.config.link_id_pattern);
        self.cache
            .pages
            .get_or_populate(key, self.config.cache_ttl(), || {
                with_cancel(cancel, self.transport.get_text(link))
            })
            .await
    }

    async fn process_link(
        &self,
        link: &str,
        request: &GroupRequest,
        cancel: &CancellationToken,
        image_pool: &Semaphore,
    ) -> Result<LinkOutcome> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let html = self.fetch_page(link, cancel).await?;
        let LessonMarkup {
            title,
            image_hrefs,
            video_url,
        } = self.extractor.parse_lesson(&html, link);

        if request.mode == ScrapeMode::Download {
            if let Some(selection) = &request.selection {
                if !selection.admits(&title) {
                    log::debug!("Skipping unselected lesson {title:?}");
                    return Ok(LinkOutcome::Skipped);
                }
            }
        }

        let has_video = video_url.is_some();
        if !request.filters.admits(has_video, image_hrefs.len()) {
            return Ok(LinkOutcome::Filtered);
        }

        let base = self.base_url.as_deref().unwrap_or(link);
        let images = self
            .resolve_images(&image_hrefs, base, cancel, image_pool)
            .await?;

        Ok(LinkOutcome::Item(LessonItem {
            title,
            images,
            has_video,
            video_url,
            full_link: link.to_string(),
        }))
    }

    /// Size every material href. Unresolvable hrefs are dropped; failed
    /// lookups become failed descriptors.
    async fn resolve_images(
        &self,
        hrefs: &[String],
        base: &str,
        cancel: &CancellationToken,
        image_pool: &Semaphore,
    ) -> Result<Vec<ImageDescriptor>> {
        let mut images = Vec::with_capacity(hrefs.len());
        let mut lookups = stream::iter(hrefs.iter().cloned())
            .map(|href| async move { self.resolve_image(&href, base, cancel, image_pool).await })
            .buffered(self.config.image_concurrency.max(1));

        while let Some(result) = lookups.next().await {
            if let Some(descriptor) = result? {
                images.push(descriptor);
            }
        }
        Ok(images)
    }

    async fn resolve_image(
        &self,
        href: &str,
        base: &str,
        cancel: &CancellationToken,
        image_pool: &Semaphore,
    ) -> Result<Option<ImageDescriptor>> {
        let Some(url) = resolve(base, href) else {
            log::debug!("Skipping unresolvable image href {href:?}");
            return Ok(None);
        };

        let size = self
            .cache
            .image_sizes
            .get_or_populate(url.clone(), self.config.cache_ttl(), || {
                with_cancel(cancel, async {
                    let _permit = image_pool
                        .acquire()
                        .await
                        .map_err(|_| AppError::Cancelled)?;
                    self.transport.content_length(&url).await
                })
            })
            .await;

        match size {
            Ok(size) => {
                let name = file_name(&url);
                Ok(Some(ImageDescriptor::resolved(url, name, size)))
            }
            Err(error) if error.is_cancelled() => Err(error),
            Err(error) => {
                log::warn!("Failed to size image {url}: {error}");
                Ok(Some(ImageDescriptor::failed(error.to_string())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{SiteSelectors, VideoConfig};
    use crate::services::extract::testing::lesson_page;
    use crate::services::selection::SelectionModel;
    use crate::utils::http::testing::FakeTransport;

    const BASE: &str = "https://lms.example.com";

    fn lesson_url(id: u32) -> String {
        format!("{BASE}/web/lection/{id}/show_lection")
    }

    fn fetcher(transport: Arc<FakeTransport>, cache: Arc<FetchCache>) -> BoundedFetcher {
        let extractor =
            MarkupExtractor::new(&SiteSelectors::default(), &VideoConfig::default()).unwrap();
        BoundedFetcher::new(
            transport,
            cache,
            Arc::new(extractor),
            FetcherConfig::default(),
        )
        .with_base_url(BASE)
    }

    fn cache() -> Arc<FetchCache> {
        Arc::new(FetchCache::new(Duration::from_secs(30 * 60)))
    }

    #[tokio::test]
    async fn test_items_keep_link_and_href_order() {
        let transport = Arc::new(FakeTransport::new());
        for id in 1..=3 {
            let hrefs = [format!("/img/{id}_2.jpg"), format!("/img/{id}_1.jpg")];
            let hrefs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
            transport.page(
                &lesson_url(id),
                &lesson_page(&format!("Lesson {id}"), &hrefs, None),
            );
            transport.size(&format!("{BASE}/img/{id}_2.jpg"), 200);
            transport.size(&format!("{BASE}/img/{id}_1.jpg"), 100);
        }

        let links: Vec<String> = (1..=3).map(lesson_url).collect();
        let outcome = fetcher(Arc::clone(&transport), cache())
            .process_group("Week 1", &links, &GroupRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        let titles: Vec<_> = outcome.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Lesson 1", "Lesson 2", "Lesson 3"]);

        let first = &outcome.items[0];
        assert_eq!(first.images[0].name.as_deref(), Some("1_2.jpg"));
        assert_eq!(first.images[1].size, Some(100));
        assert_eq!(first.total_size(), 300);
        assert_eq!(first.full_link, lesson_url(1));
    }

    #[tokio::test]
    async fn test_page_failure_drops_item() {
        let transport = Arc::new(FakeTransport::new());
        transport.page(&lesson_url(1), &lesson_page("One", &["/a_1.jpg"], None));
        transport.fail(&lesson_url(2));
        transport.size(&format!("{BASE}/a_1.jpg"), 10);

        let links = vec![lesson_url(1), lesson_url(2)];
        let outcome = fetcher(transport, cache())
            .process_group("G", &links, &GroupRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.item_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_size_becomes_failed_descriptor() {
        let transport = Arc::new(FakeTransport::new());
        transport.page(&lesson_url(1), &lesson_page("One", &["/ok_1.jpg", "/bad_2.jpg"], None));
        transport.size(&format!("{BASE}/ok_1.jpg"), 10);
        transport.fail(&format!("{BASE}/bad_2.jpg"));

        let outcome = fetcher(transport, cache())
            .process_group("G", &[lesson_url(1)], &GroupRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        let images = &outcome.items[0].images;
        assert_eq!(images.len(), 2);
        assert!(images[0].success);
        assert!(!images[1].success);
        assert!(images[1].error.is_some());
    }

    #[tokio::test]
    async fn test_filters_exclude_but_still_cache() {
        let transport = Arc::new(FakeTransport::new());
        transport.page(&lesson_url(1), &lesson_page("Text only", &[], None));
        transport.page(
            &lesson_url(2),
            &lesson_page("Video", &[], Some("https://cdn.x/v.mp4")),
        );

        let cache = cache();
        let fetcher = fetcher(Arc::clone(&transport), Arc::clone(&cache));
        let links = vec![lesson_url(1), lesson_url(2)];

        let outcome = fetcher
            .process_group("G", &links, &GroupRequest::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.filtered, 2);
        assert_eq!(cache.pages.len(), 2);

        let request = GroupRequest {
            filters: ItemFilters::video_only(),
            ..GroupRequest::default()
        };
        let outcome = fetcher
            .process_group("G", &links, &request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.items[0].has_video);
        assert_eq!(transport.calls(&lesson_url(1)), 1);
        assert_eq!(transport.calls(&lesson_url(2)), 1);
    }

    #[tokio::test]
    async fn test_download_mode_skips_unselected() {
        let transport = Arc::new(FakeTransport::new());
        transport.page(&lesson_url(1), &lesson_page("Keep", &["/keep_1.jpg"], None));
        transport.page(&lesson_url(2), &lesson_page("Drop", &["/drop_1.jpg"], None));
        transport.size(&format!("{BASE}/keep_1.jpg"), 5);
        transport.size(&format!("{BASE}/drop_1.jpg"), 5);

        let mut selection = SelectionModel::new();
        selection.register_items("G", ["Keep", "Drop"]);
        selection.select_item("G", "Keep", true);

        let request = GroupRequest {
            mode: ScrapeMode::Download,
            selection: selection.group("G").cloned(),
            filters: ItemFilters::default(),
        };
        let outcome = fetcher(Arc::clone(&transport), cache())
            .process_group("G", &[lesson_url(1), lesson_url(2)], &request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].title, "Keep");
        assert_eq!(outcome.skipped, 1);
        // The skipped lesson's images are never sized.
        assert_eq!(transport.calls(&format!("{BASE}/keep_1.jpg")), 1);
        assert_eq!(transport.calls(&format!("{BASE}/drop_1.jpg")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_lookups_share_one_pool_across_pages() {
        let transport = Arc::new(FakeTransport::new());
        for id in 1..=6 {
            let hrefs: Vec<String> = (1..=8).map(|n| format!("/img/{id}_{n}.jpg")).collect();
            let hrefs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
            transport.page(&lesson_url(id), &lesson_page(&format!("Lesson {id}"), &hrefs, None));
            for n in 1..=8 {
                transport.slow_size(
                    &format!("{BASE}/img/{id}_{n}.jpg"),
                    10,
                    Duration::from_millis(20),
                );
            }
        }

        let extractor =
            MarkupExtractor::new(&SiteSelectors::default(), &VideoConfig::default()).unwrap();
        let config = FetcherConfig {
            page_concurrency: 6,
            image_concurrency: 4,
            ..FetcherConfig::default()
        };
        let fetcher = BoundedFetcher::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            cache(),
            Arc::new(extractor),
            config,
        )
        .with_base_url(BASE);

        let links: Vec<String> = (1..=6).map(lesson_url).collect();
        let outcome = fetcher
            .process_group("G", &links, &GroupRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 6);
        assert!(outcome.items.iter().all(|i| i.total_size() == 80));
        let peak = transport.peak_in_flight();
        assert!(peak <= 4, "{peak} image lookups in flight");
        assert!(peak >= 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_group() {
        let transport = Arc::new(FakeTransport::new());
        transport.page(&lesson_url(1), &lesson_page("One", &["/a_1.jpg"], None));

        let token = CancellationToken::new();
        token.cancel();
        let result = fetcher(Arc::clone(&transport), cache())
            .process_group("G", &[lesson_url(1)], &GroupRequest::default(), &token)
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(transport.total_calls(), 0);
    }
}
