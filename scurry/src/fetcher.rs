//! The rate-limited HTTP fetch client.
//!
//! Redirects are surfaced, never followed: a 3xx response comes back with
//! `moved_to` set and it is the crawl loop's job to decide whether the
//! target gets scheduled, under the same depth/dedup policy as any other
//! discovered link. The client also enforces a minimum spacing between
//! request starts, independent of the queue's own politeness gate.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use reqwest::{header, StatusCode};
use tracing::{debug, trace, warn};
use url::Url;

use scurry_config::{build_http_client, CrawlConfig, HttpClientParams};
use scurry_queue::FetchItem;

/// Redirect statuses whose `Location` is surfaced to the caller.
const REDIRECT_CODES: &[u16] = &[300, 301, 302, 303, 307, 308];

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("page advertises {size} bytes, over the configured maximum")]
    PageTooLarge { size: u64 },
    #[error("fetch client has been shut down")]
    ClientClosed,
    #[error("error loading response content: {0}")]
    ContentLoad(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Outcome of one GET. For 2xx responses the body is still unread; call
/// [`FetchResult::read_body`] to stream it in, capped. Dropping the result
/// without reading releases the pooled connection.
#[derive(Debug)]
pub struct FetchResult {
    pub status: StatusCode,
    /// Response headers in wire order.
    pub headers: Vec<(String, String)>,
    /// The URL the response was actually served from (2xx only).
    pub final_url: Option<Url>,
    /// Redirect target, resolved against the request URL (3xx only).
    pub moved_to: Option<Url>,
    pub content_type: Option<String>,
    pub charset: Option<String>,
    response: Option<reqwest::Response>,
}

impl FetchResult {
    /// Stream the body in bounded chunks, reading at most `max_bytes`
    /// regardless of what the server advertised. Returns exactly the bytes
    /// read.
    pub async fn read_body(&mut self, max_bytes: usize) -> Result<Vec<u8>, FetchError> {
        let Some(mut response) = self.response.take() else {
            return Ok(Vec::new());
        };

        let mut content = Vec::new();
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => return Err(FetchError::ContentLoad(err.to_string())),
            };
            let remaining = max_bytes - content.len();
            if chunk.len() >= remaining {
                content.extend_from_slice(&chunk[..remaining]);
                trace!("body capped at {max_bytes} bytes");
                break;
            }
            content.extend_from_slice(&chunk);
        }
        Ok(content)
    }
}

pub struct Fetcher {
    client: reqwest::Client,
    min_delay: Duration,
    max_download_size: usize,
    /// Timestamp of the previous request start. The dedicated lock
    /// serializes the spacing decision across all concurrent fetches.
    last_request: tokio::sync::Mutex<Option<Instant>>,
    closed: AtomicBool,
}

impl Fetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(HttpClientParams::from_config(config))?;
        Ok(Self {
            client,
            min_delay: Duration::from_millis(config.crawler.politeness_delay_ms),
            max_download_size: config.crawler.max_download_size,
            last_request: tokio::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn max_download_size(&self) -> usize {
        self.max_download_size
    }

    /// Issue a GET for the item's URL. Applies the inter-request delay,
    /// classifies the status, and rejects oversized pages before their body
    /// is buffered.
    pub async fn fetch(&self, item: &FetchItem) -> Result<FetchResult, FetchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::ClientClosed);
        }

        {
            let mut last_request = self.last_request.lock().await;
            if let Some(previous) = *last_request {
                let elapsed = previous.elapsed();
                if elapsed < self.min_delay {
                    tokio::time::sleep(self.min_delay - elapsed).await;
                }
            }
            *last_request = Some(Instant::now());
        }

        // The spacing sleep may outlive a shutdown signal; don't start a
        // request that nobody wants anymore.
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::ClientClosed);
        }

        let response = self.client.get(item.url.clone()).send().await?;
        let status = response.status();
        let headers = collect_headers(&response);
        let (content_type, charset) = content_type_of(&response);

        let mut result = FetchResult {
            status,
            headers,
            final_url: None,
            moved_to: None,
            content_type,
            charset,
            response: None,
        };

        if REDIRECT_CODES.contains(&status.as_u16()) {
            if let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
            {
                match response.url().join(location) {
                    Ok(target) => {
                        debug!("{} moved to {}", item.url, target);
                        result.moved_to = Some(target);
                    }
                    Err(err) => warn!("unusable Location header {location}: {err}"),
                }
            }
            // The response is dropped unread; its connection goes back to
            // the pool.
            return Ok(result);
        }

        if status.is_success() {
            result.final_url = Some(response.url().clone());

            if let Some(size) = advertised_length(&response) {
                if size > self.max_download_size as u64 {
                    return Err(FetchError::PageTooLarge { size });
                }
            }
            result.response = Some(response);
        }

        Ok(result)
    }

    /// Stop the client. Idempotent and callable from any task; in-flight
    /// requests finish or time out naturally, subsequent `fetch` calls fail
    /// fast. Pooled connections are torn down by the pool's own idle
    /// reaping once unused.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("fetch client shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn collect_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Content type and charset, split out of the `Content-Type` header.
fn content_type_of(response: &reqwest::Response) -> (Option<String>, Option<String>) {
    let Some(content_type) = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return (None, None);
    };

    let charset = content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("charset="))
        .map(|charset| charset.trim_matches('"').to_string());

    (Some(content_type.to_string()), charset)
}

/// Advertised body length: `Content-Length` as parsed by the client, with a
/// raw-header fallback for responses where decoding hides it.
fn advertised_length(response: &reqwest::Response) -> Option<u64> {
    response.content_length().or_else(|| {
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    })
}
