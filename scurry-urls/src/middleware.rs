//! Middlewares for shaping candidate URL lists before scheduling.

use std::collections::HashSet;

use url::Url;

/// Trait that defines middleware for processing lists of URLs.
pub trait Middleware: Send + Sync {
    /// Process a list of URLs and return a modified list.
    fn process(&self, urls: Vec<Url>) -> Vec<Url>;
}

impl Middleware for Box<dyn Middleware> {
    fn process(&self, urls: Vec<Url>) -> Vec<Url> {
        (**self).process(urls)
    }
}

/// Removes duplicate URLs from a list, keeping first occurrences.
#[derive(Debug)]
pub struct DeduplicateMiddleware;

impl Middleware for DeduplicateMiddleware {
    fn process(&self, urls: Vec<Url>) -> Vec<Url> {
        let mut seen = HashSet::new();
        urls.into_iter()
            .filter(|url| seen.insert(url.as_str().to_string()))
            .collect()
    }
}

/// Drops URLs whose scheme is excluded by configuration.
#[derive(Debug, Default)]
pub struct SchemeFilterMiddleware {
    pub skip_https: bool,
    pub skip_ftp: bool,
    pub skip_mailto: bool,
}

impl Middleware for SchemeFilterMiddleware {
    fn process(&self, urls: Vec<Url>) -> Vec<Url> {
        urls.into_iter()
            .filter(|url| match url.scheme() {
                "https" => !self.skip_https,
                "ftp" | "ftps" => !self.skip_ftp,
                "mailto" => !self.skip_mailto,
                _ => true,
            })
            .collect()
    }
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "bmp", "gif", "ico", "jpeg", "jpg", "png", "svg", "tif", "tiff", "webp",
];

/// Drops URLs whose path looks like an image file.
#[derive(Debug)]
pub struct ImageFilterMiddleware;

impl Middleware for ImageFilterMiddleware {
    fn process(&self, urls: Vec<Url>) -> Vec<Url> {
        urls.into_iter()
            .filter(|url| {
                let path = url.path().to_ascii_lowercase();
                !IMAGE_EXTENSIONS
                    .iter()
                    .any(|ext| path.ends_with(&format!(".{ext}")))
            })
            .collect()
    }
}

/// Filters URLs based on whether they belong to the same site as a base URL.
#[derive(Debug)]
pub struct SiteFilterMiddleware {
    base_url: Url,
    same_site: bool,
}

impl SiteFilterMiddleware {
    pub fn new(base_url: Url, same_site: bool) -> Self {
        Self { base_url, same_site }
    }

    /// Keep only URLs on the same host as the base URL.
    pub fn on_site(base_url: Url) -> Self {
        Self::new(base_url, true)
    }

    /// Keep only URLs on hosts other than the base URL's.
    pub fn off_site(base_url: Url) -> Self {
        Self::new(base_url, false)
    }
}

impl Middleware for SiteFilterMiddleware {
    fn process(&self, urls: Vec<Url>) -> Vec<Url> {
        let base_host = self.base_url.host_str();

        urls.into_iter()
            .filter(|url| {
                let same_site = base_host == url.host_str();
                if self.same_site {
                    same_site
                } else {
                    !same_site
                }
            })
            .collect()
    }
}

/// Caps the list at a maximum number of URLs.
#[derive(Debug)]
pub struct LimitMiddleware {
    max: usize,
}

impl LimitMiddleware {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl Middleware for LimitMiddleware {
    fn process(&self, mut urls: Vec<Url>) -> Vec<Url> {
        urls.truncate(self.max);
        urls
    }
}
