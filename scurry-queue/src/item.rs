//! One URL's crawl record.

use serde::{Deserialize, Serialize};
use url::Url;

/// Lifecycle of a [`FetchItem`]. `Queued` and `InProgress` items are owned
/// by the queue's accounting; `Fetched`/`Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Queued,
    InProgress,
    Fetched,
    Failed,
}

/// A scheduled URL together with its crawl metadata.
///
/// `depth` is `>= 0` for items to fetch; `-1` marks a revisit record for an
/// already-seen URL, which is tracked but never counted against the depth
/// limit again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchItem {
    /// Document id, assigned by the queue when the item is first accepted.
    pub item_id: u64,
    /// The URL to request.
    pub url: Url,
    /// Set when the server redirected or normalized the request.
    pub resolved_url: Option<Url>,
    /// Provenance only; scheduling never follows this chain.
    pub parent_id: Option<u64>,
    pub depth: i16,
    pub status: FetchStatus,
}

impl FetchItem {
    pub fn new(url: Url, depth: i16) -> Self {
        Self {
            item_id: 0,
            url,
            resolved_url: None,
            parent_id: None,
            depth,
            status: FetchStatus::Queued,
        }
    }

    pub fn with_parent(url: Url, depth: i16, parent_id: u64) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::new(url, depth)
        }
    }

    /// Point the item at the URL the server actually served, under a fresh
    /// document id.
    pub fn retarget(&mut self, url: Url, item_id: u64) {
        self.resolved_url = Some(url.clone());
        self.url = url;
        self.item_id = item_id;
    }

    /// Whether this is a revisit record for an already-seen URL.
    pub fn is_revisit(&self) -> bool {
        self.depth < 0
    }
}
