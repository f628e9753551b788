//! HTML parsing and CSS-selector extraction.
//!
//! Consumes raw response bodies as text and pulls out links, images, and
//! selector-mapped metadata. Extraction is deliberately forgiving: the
//! html5ever parser recovers from malformed markup, and an invalid selector
//! degrades to an empty (or partial) result with a warning rather than
//! failing the caller's fetch pipeline.
//!
//! # Example
//!
//! ```
//! use fetchkit::parser::extract_links;
//! use url::Url;
//!
//! let html = r#"<a href="/docs" title="Docs">Read the docs</a>"#;
//! let base = Url::parse("https://example.com/").unwrap();
//! let links = extract_links(html, Some(&base), None);
//!
//! assert_eq!(links[0].url, "https://example.com/docs");
//! assert_eq!(links[0].text, "Read the docs");
//! ```

use std::collections::HashMap;

use scraper::{Html, Selector};
use serde::Serialize;
use tracing::warn;
use url::Url;

/// Default selector for link extraction.
pub const DEFAULT_LINK_SELECTOR: &str = "a[href]";

/// Default selector for image extraction.
pub const DEFAULT_IMAGE_SELECTOR: &str = "img[src]";

/// A hyperlink extracted from a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// The link target, resolved against the base URL when one is given.
    pub url: String,
    /// Visible link text, trimmed.
    pub text: String,
    /// The `title` attribute, empty when absent.
    pub title: String,
}

/// An image reference extracted from a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    /// The image source, resolved against the base URL when one is given.
    pub url: String,
    /// The `alt` attribute, empty when absent.
    pub alt: String,
    /// The `title` attribute, empty when absent.
    pub title: String,
}

/// How to pull one metadata field out of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelector {
    /// Text content of the first element matching the selector.
    Text(String),
    /// A named attribute of the first element matching the selector.
    Attr(String, String),
}

/// Parses an HTML document.
///
/// html5ever recovers from malformed input, so this cannot fail; an empty
/// string yields an empty document.
#[must_use]
pub fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}

/// Extracts links from HTML.
///
/// Uses [`DEFAULT_LINK_SELECTOR`] unless `selector` overrides it. Fragment
/// and `javascript:` hrefs are skipped; relative hrefs resolve against
/// `base` when given and are kept verbatim otherwise. An invalid selector
/// yields an empty list.
#[must_use]
pub fn extract_links(html: &str, base: Option<&Url>, selector: Option<&str>) -> Vec<Link> {
    let document = parse_document(html);
    let selector_str = selector.unwrap_or(DEFAULT_LINK_SELECTOR);
    let Ok(selector) = Selector::parse(selector_str) else {
        warn!(selector = selector_str, "invalid link selector");
        return Vec::new();
    };

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        let Some(url) = resolve(href, base) else {
            continue;
        };
        links.push(Link {
            url,
            text: element.text().collect::<String>().trim().to_string(),
            title: attr_or_empty(&element, "title"),
        });
    }
    links
}

/// Extracts image references from HTML.
///
/// Uses [`DEFAULT_IMAGE_SELECTOR`] unless `selector` overrides it. An
/// invalid selector yields an empty list.
#[must_use]
pub fn extract_images(html: &str, base: Option<&Url>, selector: Option<&str>) -> Vec<ImageRef> {
    let document = parse_document(html);
    let selector_str = selector.unwrap_or(DEFAULT_IMAGE_SELECTOR);
    let Ok(selector) = Selector::parse(selector_str) else {
        warn!(selector = selector_str, "invalid image selector");
        return Vec::new();
    };

    let mut images = Vec::new();
    for element in document.select(&selector) {
        let Some(src) = element.value().attr("src").map(str::trim) else {
            continue;
        };
        if src.is_empty() {
            continue;
        }
        let Some(url) = resolve(src, base) else {
            continue;
        };
        images.push(ImageRef {
            url,
            alt: attr_or_empty(&element, "alt"),
            title: attr_or_empty(&element, "title"),
        });
    }
    images
}

/// Extracts metadata fields using a selector map.
///
/// Each key maps to a [`FieldSelector`]; a key is present in the result only
/// when its selector matches an element. Invalid selectors are logged and
/// skipped, so a single bad entry cannot poison the rest of the map.
#[must_use]
pub fn extract_metadata(
    html: &str,
    selectors: &HashMap<String, FieldSelector>,
) -> HashMap<String, String> {
    let document = parse_document(html);

    let mut metadata = HashMap::new();
    for (key, field) in selectors {
        let (selector_str, attribute) = match field {
            FieldSelector::Text(selector) => (selector.as_str(), None),
            FieldSelector::Attr(selector, attribute) => {
                (selector.as_str(), Some(attribute.as_str()))
            }
        };

        let Ok(selector) = Selector::parse(selector_str) else {
            warn!(key = %key, selector = selector_str, "invalid metadata selector");
            continue;
        };
        let Some(element) = document.select(&selector).next() else {
            continue;
        };

        let value = match attribute {
            Some(attribute) => attr_or_empty(&element, attribute),
            None => element.text().collect::<String>().trim().to_string(),
        };
        metadata.insert(key.clone(), value);
    }
    metadata
}

fn resolve(href: &str, base: Option<&Url>) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(|url| url.to_string()),
        None => Some(href.to_string()),
    }
}

fn attr_or_empty(element: &scraper::ElementRef<'_>, name: &str) -> String {
    element.value().attr(name).unwrap_or("").trim().to_string()
}
