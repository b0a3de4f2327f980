//! The robots-compliance boundary.
//!
//! Workers consult a [`RobotsPolicy`] before scheduling any discovered URL.
//! Policy evaluation itself (fetching and parsing robots.txt) is an
//! external concern; the crate ships only the permissive default.

use async_trait::async_trait;
use url::Url;

/// Decides whether the crawler may visit a URL. Implementations must be
/// callable concurrently from multiple workers.
#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    async fn allows(&self, url: &Url) -> bool;
}

/// Permits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl RobotsPolicy for AllowAll {
    async fn allows(&self, _url: &Url) -> bool {
        true
    }
}
