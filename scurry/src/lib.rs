//! # scurry
//!
//! `scurry` is a polite, resumable, multi-threaded web crawler toolkit: give
//! it seed URLs and it fetches pages, extracts outgoing links, and
//! recursively schedules them subject to depth, count, and rate limits,
//! while letting you plug in the decisions (visit policy, robots compliance)
//! and the handling of every fetched page.
//!
//! ## Architecture
//!
//! - A shared, politeness-aware work queue ([`scurry_queue::FetchQueue`])
//!   that bounds concurrency and request rate at a single admission point.
//! - A pool of workers ([`crawl::Worker`]) that drain the queue and feed
//!   discovered links back in.
//! - A supervising session ([`crawl::CrawlSession`]) that starts the pool,
//!   restarts crashed workers, detects quiescence, and releases anyone
//!   blocked on crawl completion.
//! - A rate-limited fetch client ([`fetcher::Fetcher`]) that surfaces
//!   redirects instead of following them and caps download sizes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scurry::crawl::{CrawlSession, DefaultHandler};
//! use scurry::CrawlConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = CrawlConfig::default();
//!     config.crawler.storage_folder = "/tmp/scurry".into();
//!
//!     let session = Arc::new(CrawlSession::with_defaults(config)?);
//!     session.add_seed("http://example.com/")?;
//!     session.start(|| DefaultHandler, 4, true).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - `crawl`: workers, lifecycle handler trait, and the supervising session.
//! - `fetcher`: the rate-limited HTTP client.
//! - `page`: fetched-page data model.
//! - `parser`: the content-parser boundary and the default link extractor.
//! - `robots`: the robots-compliance boundary.

pub mod crawl;
pub mod fetcher;
pub mod page;
pub mod parser;
pub mod robots;

pub use scurry_config as config;
pub use scurry_queue as queue;
pub use scurry_urls as urls;

pub use config::{ConfigError, CrawlConfig};
pub use crawl::{CrawlHandler, CrawlSession, DefaultHandler, Worker, WorkerId};
pub use fetcher::{FetchError, FetchResult, Fetcher};
pub use page::Page;
pub use parser::{ContentParser, LinkExtractor, ParseData, ParseError};
pub use queue::{FetchItem, FetchQueue, FetchStatus};
pub use robots::{AllowAll, RobotsPolicy};

// re-export
pub use async_trait;
pub use reqwest;
pub use tracing;
pub use tracing_subscriber;
pub use url;
