//! The content-parser boundary and the default link extractor.
//!
//! Parsing internals are pluggable: workers only depend on the
//! [`ContentParser`] trait. [`LinkExtractor`] is the batteries-included
//! implementation covering the common cases (binary payloads, plain text,
//! HTML).

use std::collections::HashSet;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, trace};
use url::Url;

use scurry_config::UrlFilters;
use scurry_urls::ensure_scheme;

use crate::page::Page;

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// Content excluded by configuration (e.g. binary payloads when images
    /// are skipped). Not a failure of the crawl; callers skip silently.
    #[error("content excluded by configuration")]
    DisallowedContent,
    #[error("malformed content: {0}")]
    Malformed(String),
}

/// Output of a content parser: extracted text plus candidate outgoing URLs
/// (duplicates collapsed, order irrelevant).
#[derive(Debug, Clone, Default)]
pub struct ParseData {
    pub text: String,
    pub outgoing_urls: HashSet<Url>,
}

/// Turns a fetched page into extracted text and candidate outgoing URLs.
/// Implementations must be callable concurrently from multiple workers.
pub trait ContentParser: Send + Sync {
    fn parse(&self, page: &Page, context_url: &Url) -> Result<ParseData, ParseError>;
}

/// Default parser: routes on content type.
///
/// - binary types (`image`, `audio`, `video`, `application`): rejected as
///   disallowed when images are skipped, otherwise an empty parse;
/// - `text/*` other than HTML: URLs extracted with a regex;
/// - everything else is treated as HTML and mined for `<a href>` links,
///   resolved against `<base href>` when present.
pub struct LinkExtractor {
    skip_images: bool,
    max_outgoing_links: usize,
    url_pattern: Regex,
}

impl LinkExtractor {
    pub fn new(filters: &UrlFilters) -> Self {
        Self {
            skip_images: filters.skip_images,
            max_outgoing_links: filters.max_outgoing_links,
            // Scheme-or-www prefixed runs of URL-safe characters; trailing
            // punctuation is trimmed per match.
            url_pattern: Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s"'<>()\[\]{}]+"#)
                .expect("static URL pattern"),
        }
    }

    fn parse_plain_text(&self, page: &Page) -> ParseData {
        let text = String::from_utf8_lossy(&page.content).into_owned();
        let mut outgoing_urls = HashSet::new();
        for found in self.url_pattern.find_iter(&text) {
            let candidate = found.as_str().trim_end_matches(['.', ',', ';', ':']);
            if let Ok(url) = Url::parse(&ensure_scheme(candidate)) {
                outgoing_urls.insert(url);
                if outgoing_urls.len() >= self.max_outgoing_links {
                    break;
                }
            }
        }
        ParseData { text, outgoing_urls }
    }

    fn parse_html(&self, page: &Page, context_url: &Url) -> Result<ParseData, ParseError> {
        let html = String::from_utf8_lossy(&page.content);
        let document = Html::parse_document(&html);

        let base_selector =
            Selector::parse("base[href]").map_err(|e| ParseError::Malformed(e.to_string()))?;
        let anchor_selector =
            Selector::parse("a[href]").map_err(|e| ParseError::Malformed(e.to_string()))?;

        // <base href> overrides the context URL for relative links.
        let base_url = document
            .select(&base_selector)
            .next()
            .and_then(|base| base.value().attr("href"))
            .and_then(|href| context_url.join(href).ok())
            .unwrap_or_else(|| context_url.clone());

        let mut outgoing_urls = HashSet::new();
        for anchor in document.select(&anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() {
                continue;
            }
            let lowered = href.to_lowercase();
            if lowered.contains("javascript:") || lowered.contains("mailto:") || href.contains('@')
            {
                continue;
            }
            match base_url.join(href) {
                Ok(mut url) => {
                    url.set_fragment(None);
                    outgoing_urls.insert(url);
                }
                Err(err) => trace!("unresolvable href {href}: {err}"),
            }
            if outgoing_urls.len() >= self.max_outgoing_links {
                break;
            }
        }

        let text = document
            .root_element()
            .text()
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(ParseData { text, outgoing_urls })
    }
}

impl ContentParser for LinkExtractor {
    fn parse(&self, page: &Page, context_url: &Url) -> Result<ParseData, ParseError> {
        if has_binary_content(page.content_type.as_deref()) {
            if self.skip_images {
                return Err(ParseError::DisallowedContent);
            }
            debug!("binary content at {}, nothing to extract", context_url);
            return Ok(ParseData::default());
        }
        if has_plain_text_content(page.content_type.as_deref()) {
            return Ok(self.parse_plain_text(page));
        }
        self.parse_html(page, context_url)
    }
}

fn has_binary_content(content_type: Option<&str>) -> bool {
    let type_str = content_type.unwrap_or("").to_lowercase();
    ["image", "audio", "video", "application"]
        .iter()
        .any(|kind| type_str.contains(kind))
}

fn has_plain_text_content(content_type: Option<&str>) -> bool {
    let type_str = content_type.unwrap_or("").to_lowercase();
    type_str.contains("text") && !type_str.contains("html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scurry_queue::FetchItem;

    fn page(content_type: &str, body: &str) -> Page {
        let item = FetchItem::new(Url::parse("http://site.test/dir/page").unwrap(), 0);
        let mut page = Page::new(item, 200, vec![]);
        page.content_type = Some(content_type.to_string());
        page.content = body.as_bytes().to_vec();
        page
    }

    fn extractor() -> LinkExtractor {
        LinkExtractor::new(&UrlFilters::default())
    }

    fn context() -> Url {
        Url::parse("http://site.test/dir/page").unwrap()
    }

    #[test]
    fn html_links_resolve_against_context() {
        let page = page(
            "text/html; charset=utf-8",
            r#"<html><body>
                <a href="child">relative</a>
                <a href="/rooted">rooted</a>
                <a href="http://other.test/abs">absolute</a>
                <a href="mailto:x@y.test">mail</a>
                <a href="javascript:void(0)">js</a>
            </body></html>"#,
        );
        let parsed = extractor().parse(&page, &context()).unwrap();
        let urls: HashSet<String> = parsed
            .outgoing_urls
            .iter()
            .map(|u| u.as_str().to_string())
            .collect();
        assert!(urls.contains("http://site.test/dir/child"));
        assert!(urls.contains("http://site.test/rooted"));
        assert!(urls.contains("http://other.test/abs"));
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn base_href_overrides_context() {
        let page = page(
            "text/html",
            r#"<html><head><base href="http://cdn.test/assets/"></head>
               <body><a href="x.html">x</a></body></html>"#,
        );
        let parsed = extractor().parse(&page, &context()).unwrap();
        assert!(parsed
            .outgoing_urls
            .contains(&Url::parse("http://cdn.test/assets/x.html").unwrap()));
    }

    #[test]
    fn html_text_is_extracted() {
        let page = page("text/html", "<html><body><p>hello</p> <p>world</p></body></html>");
        let parsed = extractor().parse(&page, &context()).unwrap();
        assert!(parsed.text.contains("hello"));
        assert!(parsed.text.contains("world"));
    }

    #[test]
    fn plain_text_urls_are_extracted() {
        let page = page(
            "text/plain",
            "see http://a.test/x and www.b.test/y, or nothing.",
        );
        let parsed = extractor().parse(&page, &context()).unwrap();
        assert!(parsed.outgoing_urls.contains(&Url::parse("http://a.test/x").unwrap()));
        assert!(parsed.outgoing_urls.contains(&Url::parse("http://www.b.test/y").unwrap()));
    }

    #[test]
    fn binary_content_is_disallowed_when_images_skipped() {
        let mut filters = UrlFilters::default();
        filters.skip_images = true;
        let extractor = LinkExtractor::new(&filters);
        let page = page("image/png", "");
        assert!(matches!(
            extractor.parse(&page, &context()),
            Err(ParseError::DisallowedContent)
        ));
    }

    #[test]
    fn binary_content_yields_empty_parse_otherwise() {
        let page = page("application/pdf", "%PDF-");
        let parsed = extractor().parse(&page, &context()).unwrap();
        assert!(parsed.text.is_empty());
        assert!(parsed.outgoing_urls.is_empty());
    }

    #[test]
    fn link_cap_is_enforced() {
        let mut filters = UrlFilters::default();
        filters.max_outgoing_links = 2;
        let extractor = LinkExtractor::new(&filters);
        let body: String = (0..10)
            .map(|i| format!(r#"<a href="/p{i}">p{i}</a>"#))
            .collect();
        let page = page("text/html", &format!("<html><body>{body}</body></html>"));
        let parsed = extractor.parse(&page, &context()).unwrap();
        assert_eq!(parsed.outgoing_urls.len(), 2);
    }
}
