// src/services/extract.rs

//! Markup extraction for the course site.
//!
//! Turns the root course page into ordered group → lesson link lists and a
//! lesson page into its title, material hrefs and video signal. All parsing
//! is synchronous and returns owned data, so callers never keep a parsed
//! document alive across an `.await`.

use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{SiteSelectors, VideoConfig};
use crate::services::video::{PageView, VideoExtractor};
use crate::utils::url::resolve;

/// Details extracted from one lesson page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonMarkup {
    pub title: String,
    /// Material anchors' `href` values, unresolved, in document order
    pub image_hrefs: Vec<String>,
    pub video_url: Option<String>,
}

impl LessonMarkup {
    pub fn has_video(&self) -> bool {
        self.video_url.is_some()
    }
}

/// Extracts structure from course markup using configured selectors.
pub struct MarkupExtractor {
    group_title: Selector,
    group_row: Selector,
    lesson_block: Selector,
    lesson_link: Selector,
    link_attr: String,
    lesson_title: Selector,
    material_link: Selector,
    video: VideoExtractor,
}

impl MarkupExtractor {
    pub fn new(selectors: &SiteSelectors, video: &VideoConfig) -> Result<Self> {
        Ok(Self {
            group_title: Self::parse_selector(&selectors.group_title)?,
            group_row: Self::parse_selector(&selectors.group_row)?,
            lesson_block: Self::parse_selector(&selectors.lesson_block)?,
            lesson_link: Self::parse_selector(&selectors.lesson_link)?,
            link_attr: selectors.link_attr.clone(),
            lesson_title: Self::parse_selector(&selectors.lesson_title)?,
            material_link: Self::parse_selector(&selectors.material_link)?,
            video: VideoExtractor::new(video)?,
        })
    }

    /// Ordered group → lesson URLs from the root course page.
    ///
    /// Each group title is followed to its closest row container; the lesson
    /// block must be the row's next sibling element. Link values are resolved
    /// against `base`. A repeated group name replaces the earlier entry but
    /// keeps its position. Finding no group titles at all is a parse error.
    pub fn parse_groups(&self, html: &str, base: &str) -> Result<Vec<(String, Vec<String>)>> {
        let document = Html::parse_document(html);
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();

        for title in document.select(&self.group_title) {
            let name = Self::text_of(&title);
            let links = self.group_links(&title, base);

            match groups.iter_mut().find(|(existing, _)| *existing == name) {
                Some(entry) => entry.1 = links,
                None => groups.push((name, links)),
            }
        }

        if groups.is_empty() {
            return Err(AppError::parse("no lesson groups found on the page"));
        }
        Ok(groups)
    }

    fn group_links(&self, title: &ElementRef<'_>, base: &str) -> Vec<String> {
        let Some(row) = title
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| self.group_row.matches(el))
        else {
            return Vec::new();
        };

        let Some(block) = row
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .filter(|el| self.lesson_block.matches(el))
        else {
            return Vec::new();
        };

        block
            .select(&self.lesson_link)
            .filter_map(|link| link.value().attr(&self.link_attr))
            .filter_map(|href| {
                let resolved = resolve(base, href);
                if resolved.is_none() {
                    log::debug!("Skipping unresolvable lesson link {href:?}");
                }
                resolved
            })
            .collect()
    }

    /// Title, material hrefs and video URL of a lesson page.
    pub fn parse_lesson(&self, html: &str, page_url: &str) -> LessonMarkup {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.lesson_title)
            .next()
            .map(|el| Self::text_of(&el))
            .unwrap_or_default();

        let image_hrefs = document
            .select(&self.material_link)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
            .collect();

        let video_url = self
            .video
            .extract(&PageView::new(page_url, html, &document));

        LessonMarkup {
            title,
            image_hrefs,
            video_url,
        }
    }

    fn text_of(el: &ElementRef<'_>) -> String {
        el.text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Markup builders shared by service and pipeline tests.

    /// Root page with one section per `(group, links)` pair.
    pub fn course_page(groups: &[(&str, Vec<&str>)]) -> String {
        let mut html = String::from("<html><body><div class='container'>");
        for (name, links) in groups {
            html.push_str(&format!(
                "<div class='row'><div class='col'><span class='course_title_text'>{name}</span></div></div>"
            ));
            html.push_str("<div class='lection_main_block'><table>");
            for link in links.iter() {
                html.push_str(&format!(
                    "<tr class='lection_link' data-link='{link}'><td>lesson</td></tr>"
                ));
            }
            html.push_str("</table></div>");
        }
        html.push_str("</div></body></html>");
        html
    }

    /// Lesson page with a title, material links and an optional video element.
    pub fn lesson_page(title: &str, images: &[&str], video: Option<&str>) -> String {
        let mut html = format!("<html><body><h1 class='lection_title'> {title} </h1>");
        html.push_str("<div class='material_main'>");
        for href in images {
            html.push_str(&format!("<a href='{href}'>material</a>"));
        }
        html.push_str("</div>");
        if let Some(src) = video {
            html.push_str(&format!("<video src='{src}'></video>"));
        }
        html.push_str("</body></html>");
        html
    }
}
