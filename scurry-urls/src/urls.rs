//! URL string helpers and the `UrlList` container middlewares operate on.

use tracing::debug;
use url::Url;

use crate::middleware::Middleware;

/// A collection of candidate URLs with operations for shaping it through
/// middleware before scheduling.
#[derive(Debug, Clone)]
pub struct UrlList {
    urls: Vec<Url>,
}

impl UrlList {
    pub fn new(urls: Vec<Url>) -> Self {
        Self { urls }
    }

    /// Apply a middleware to process the URLs.
    pub fn apply<M: Middleware + ?Sized>(mut self, middleware: &M) -> Self {
        self.urls = middleware.process(self.urls);
        self
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn into_inner(self) -> Vec<Url> {
        self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Prefix `http://` when the string carries no `http(s)` scheme.
pub fn ensure_scheme(url: &str) -> String {
    let lowered = url.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Host part of a URL string, or `None` when it cannot be parsed.
pub fn domain_of(url: &str) -> Option<String> {
    match Url::parse(&ensure_scheme(url)) {
        Ok(parsed) => parsed.host_str().map(str::to_string),
        Err(err) => {
            debug!("malformed url {url}: {err}");
            None
        }
    }
}

/// Path part of a URL string, or `None` when it cannot be parsed.
pub fn path_of(url: &str) -> Option<String> {
    match Url::parse(&ensure_scheme(url)) {
        Ok(parsed) => Some(parsed.path().to_string()),
        Err(err) => {
            debug!("malformed url {url}: {err}");
            None
        }
    }
}

/// Drop everything from the first `?` on.
pub fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// All suffix levels of a hostname, most specific first. A missing `www`
/// prefix is added so `example.com` and `www.example.com` produce the same
/// ladder.
pub fn domain_levels(host: &str) -> Vec<String> {
    let host = if host.starts_with("www") {
        host.to_string()
    } else {
        format!("www.{host}")
    };

    let parts: Vec<&str> = host.split('.').collect();
    (0..parts.len()).map(|i| parts[i..].join(".")).collect()
}
