//! The lifecycle-callback capability injected into every worker.

use async_trait::async_trait;
use url::Url;

use crate::page::Page;

/// User-supplied crawl behavior: the visit policy plus lifecycle callbacks.
///
/// Every method has a no-op (or permissive) default, so implementors
/// override only what they care about. A fresh handler instance is created
/// per worker (and per restart) by the factory given to
/// [`crate::crawl::CrawlSession::start`]; instances typically wrap one
/// shared policy object and must be safe to call concurrently.
#[async_trait]
pub trait CrawlHandler: Send + Sync + 'static {
    /// Called once when the worker starts.
    async fn on_start(&self) {}

    /// Called just before the worker's task exits.
    async fn on_before_exit(&self) {}

    /// Whether a URL discovered on `page` should be scheduled.
    async fn should_visit(&self, _page: &Page, _url: &Url) -> bool {
        true
    }

    /// The per-successful-page hook; called after link scheduling.
    async fn visit(&self, _page: &Page) {}

    /// A response outside 2xx and the redirect family.
    async fn on_unexpected_status(
        &self,
        _url: &Url,
        _status_code: u16,
        _content_type: Option<&str>,
        _reason: Option<&str>,
    ) {
    }

    /// A page whose advertised or measured size exceeds the download cap.
    async fn on_page_too_large(&self, _url: &Url, _size: u64) {}

    /// The content parser rejected the payload.
    async fn on_parse_error(&self, _url: &Url) {}

    /// The response arrived but its content could not be loaded.
    async fn on_content_fetch_error(&self, _url: &Url) {}

    /// Anything else that failed while processing one item.
    async fn on_unhandled_error(&self, _url: &Url, _error: &anyhow::Error) {}
}

/// A handler that accepts every URL and does nothing on every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl CrawlHandler for DefaultHandler {}
