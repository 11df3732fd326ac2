// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

use crate::error::{AppError, Result};

/// Resolve a potentially relative href against a base URL.
///
/// Returns `None` when the base is not a URL or the href cannot be joined.
///
/// # Examples
/// ```
/// use lesson_scraper::utils::url::resolve;
///
/// assert_eq!(
///     resolve("https://example.com/path/", "page.html").as_deref(),
///     Some("https://example.com/path/page.html")
/// );
/// ```
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    Url::parse(base)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .ok()
}

/// Origin (`scheme://host[:port]`) of a URL.
pub fn origin(url: &str) -> Result<String> {
    let origin = Url::parse(url)?.origin();
    if !origin.is_tuple() {
        return Err(AppError::validation(format!(
            "URL has no usable origin: {url}"
        )));
    }
    Ok(origin.ascii_serialization())
}

/// Derive a stable lesson id from a URL path.
///
/// `pattern` is a path such as `/web/lection/:linkId/show_lection`; the
/// segment matching the `:`-prefixed placeholder becomes the id. When the
/// path does not fit the pattern, the path plus query is used instead so two
/// different pages never share a key.
pub fn link_id(url: &str, pattern: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };

    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let url_segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if pattern_segments.len() == url_segments.len() {
        let mut id = None;
        let mut matched = true;
        for (pat, seg) in pattern_segments.iter().zip(&url_segments) {
            if pat.starts_with(':') {
                id = Some(*seg);
            } else if pat != seg {
                matched = false;
                break;
            }
        }
        if let (true, Some(id)) = (matched, id) {
            return id.to_string();
        }
    }

    match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    }
}

/// Last path component of a URL, without query string or fragment.
pub fn file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string()
}

/// Numeric ordering token of a file name: the last run of digits in its stem.
///
/// Returns 0 when the name carries no digits and saturates at `u64::MAX`
/// when the run is too long to fit.
pub fn ordering_token(name: &str) -> u64 {
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };

    let mut digits: Vec<u64> = stem
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .map_while(|c| c.to_digit(10).map(u64::from))
        .collect();
    digits.reverse();

    digits
        .into_iter()
        .try_fold(0u64, |acc, d| acc.checked_mul(10)?.checked_add(d))
        .unwrap_or(u64::MAX)
}

/// Strip characters that are unsafe in file and folder names.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '<' | '>' | '(' | ')' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect::<String>()
        .trim()
        .to_string()
}
