//! The per-slot crawl loop.
//!
//! A worker drains the shared queue, fetches, parses, schedules discovered
//! links back into the queue, and dispatches the lifecycle callbacks. One
//! page's failure never terminates the worker; anything unexpected is
//! caught at the per-item boundary and routed to `on_unhandled_error`.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use derive_builder::Builder;
use tracing::{debug, info, trace, warn};
use url::Url;

use scurry_config::{CrawlConfig, UrlFilters};
use scurry_queue::{FetchItem, FetchQueue, FetchStatus};
use scurry_urls::{
    DeduplicateMiddleware, ImageFilterMiddleware, LimitMiddleware, Middleware,
    SchemeFilterMiddleware, SiteFilterMiddleware, UrlList,
};

use crate::crawl::handler::CrawlHandler;
use crate::crawl::stats::WorkerStats;
use crate::fetcher::{FetchError, Fetcher};
use crate::page::Page;
use crate::parser::{ContentParser, ParseError};
use crate::robots::RobotsPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(usize);

impl WorkerId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Builder, Clone, Debug)]
#[builder(public, setter(into))]
pub struct WorkerOptions {
    /// Sleep before re-polling when the queue has work but the admission
    /// gate (politeness or concurrency cap) is currently closed.
    #[builder(default = "Duration::from_secs(3)")]
    pub idle_backoff: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_secs(3),
        }
    }
}

pub struct Worker<H> {
    worker_id: WorkerId,
    config: Arc<CrawlConfig>,
    queue: Arc<FetchQueue>,
    fetcher: Arc<Fetcher>,
    parser: Arc<dyn ContentParser>,
    robots: Arc<dyn RobotsPolicy>,
    handler: H,
    shutting_down: Arc<AtomicBool>,
    options: WorkerOptions,
    pub stats: WorkerStats,
}

impl<H> Worker<H>
where
    H: CrawlHandler,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: WorkerId,
        config: Arc<CrawlConfig>,
        queue: Arc<FetchQueue>,
        fetcher: Arc<Fetcher>,
        parser: Arc<dyn ContentParser>,
        robots: Arc<dyn RobotsPolicy>,
        handler: H,
        shutting_down: Arc<AtomicBool>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            worker_id,
            config,
            queue,
            fetcher,
            parser,
            robots,
            handler,
            shutting_down,
            options,
            stats: WorkerStats::new(),
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// The crawl loop. Exits when the queue is drained for good or a
    /// session shutdown is signaled; per-item failures only loop onward.
    pub async fn run(mut self) {
        self.handler.on_start().await;

        loop {
            if self.is_shutting_down() {
                info!("[{}] exiting for session shutdown", self.worker_id);
                break;
            }

            let Some(mut item) = self.queue.dequeue() else {
                if self.queue.is_empty() {
                    // No work and nothing pending: this worker's life is
                    // over. The monitor respawns the pool if links show up.
                    break;
                }
                tokio::time::sleep(self.options.idle_backoff).await;
                continue;
            };

            if self.is_shutting_down() {
                // Release the slot so the in-progress count never leaks.
                self.queue.complete(&item, true);
                info!("[{}] exiting for session shutdown", self.worker_id);
                break;
            }

            let started = Instant::now();
            match self.process_item(&mut item).await {
                Ok(status) => {
                    item.status = status;
                    if status == FetchStatus::Failed {
                        self.stats.record_failure();
                    } else {
                        self.stats.record_success();
                    }
                }
                Err(err) => {
                    warn!("[{}] error processing {}: {err:#}", self.worker_id, item.url);
                    self.handler.on_unhandled_error(&item.url, &err).await;
                    item.status = FetchStatus::Failed;
                    self.stats.record_failure();
                }
            }
            self.stats.record_execution_time(started.elapsed());
            self.queue.complete(&item, true);
        }

        info!(
            "[{}] stopped: {} pages processed, {} succeeded, {} failed",
            self.worker_id,
            self.stats.pages_processed,
            self.stats.pages_succeeded,
            self.stats.pages_failed
        );
        self.handler.on_before_exit().await;
    }

    /// Process one dequeued item. Expected per-item failure classes are
    /// routed to their callbacks here and reported through the returned
    /// terminal status; only unexpected errors bubble up.
    async fn process_item(&mut self, item: &mut FetchItem) -> anyhow::Result<FetchStatus> {
        let mut result = match self.fetcher.fetch(item).await {
            Ok(result) => result,
            Err(FetchError::PageTooLarge { size }) => {
                self.handler.on_page_too_large(&item.url, size).await;
                return Ok(FetchStatus::Failed);
            }
            Err(err) => return Err(err.into()),
        };

        let status_code = result.status.as_u16();
        let page = Page::new(item.clone(), status_code, result.headers.clone());

        if let Some(moved_to) = result.moved_to.take() {
            return Ok(self.handle_redirect(item, &page, moved_to).await);
        }

        if !result.status.is_success() {
            self.handler
                .on_unexpected_status(
                    &item.url,
                    status_code,
                    result.content_type.as_deref(),
                    result.status.canonical_reason(),
                )
                .await;
            return Ok(FetchStatus::Fetched);
        }

        // The server may have normalized the URL it served; retarget the
        // item so dedup and reporting see the real document identity.
        if let Some(final_url) = result.final_url.clone() {
            if final_url != item.url {
                if self.queue.lookup_id(&final_url).is_some() {
                    debug!("resolved page {} has already been seen", final_url);
                    return Ok(FetchStatus::Fetched);
                }
                match self.queue.assign_id(&final_url) {
                    Some(item_id) => item.retarget(final_url, item_id),
                    None => warn!("cannot register resolved url {final_url}"),
                }
            }
        }

        let max_size = self.fetcher.max_download_size();
        let content = match result.read_body(max_size).await {
            Ok(content) => content,
            Err(err) => {
                warn!("content load failed for {}: {err}", item.url);
                self.handler.on_content_fetch_error(&item.url).await;
                return Ok(FetchStatus::Failed);
            }
        };
        if content.len() > max_size {
            self.handler
                .on_page_too_large(&item.url, content.len() as u64)
                .await;
            return Ok(FetchStatus::Failed);
        }

        let mut page = Page::new(item.clone(), status_code, result.headers.clone());
        page.content_type = result.content_type.clone();
        page.charset = result.charset.clone();
        page.content = content;

        let context_url = item.url.clone();
        let parsed = match self.parser.parse(&page, &context_url) {
            Ok(parsed) => parsed,
            Err(ParseError::DisallowedContent) => {
                debug!(
                    "skipping {}: content excluded by configuration",
                    item.url
                );
                return Ok(FetchStatus::Fetched);
            }
            Err(err) => {
                warn!("parse failed for {}: {err}", item.url);
                self.handler.on_parse_error(&item.url).await;
                return Ok(FetchStatus::Failed);
            }
        };

        let candidates: Vec<Url> = parsed.outgoing_urls.iter().cloned().collect();
        page.parse = Some(parsed);

        let batch = self.collect_children(&page, item, candidates).await;
        let accepted = self.queue.enqueue_all(batch);
        trace!("scheduled {accepted} links from {}", item.url);

        self.handler.visit(&page).await;
        Ok(FetchStatus::Fetched)
    }

    /// A redirect is recorded; unless redirects are configured off, its
    /// target is scheduled like any other discovered link.
    async fn handle_redirect(&self, item: &mut FetchItem, page: &Page, moved_to: Url) -> FetchStatus {
        debug!("{} redirected to {}", item.url, moved_to);
        item.resolved_url = Some(moved_to.clone());
        if !self.config.url_filters.skip_redirects {
            let batch = self.collect_children(page, item, vec![moved_to]).await;
            self.queue.enqueue_all(batch);
        }
        FetchStatus::Fetched
    }

    /// Apply the configured URL filters, then the per-candidate admission
    /// checks, and build the batch of items to schedule from one page.
    async fn collect_children(
        &self,
        page: &Page,
        parent: &FetchItem,
        candidates: Vec<Url>,
    ) -> Vec<FetchItem> {
        let mut list = UrlList::new(candidates);
        for middleware in candidate_middlewares(&self.config.url_filters, &parent.url) {
            list = list.apply(&middleware);
        }

        let max_depth = self.config.crawler.max_depth;
        let mut batch = Vec::new();
        for url in list.into_inner() {
            if let Some(existing_id) = self.queue.lookup_id(&url) {
                // Revisit record: tracked, never depth-limited again. The
                // queue's dedup makes it a no-op on the pending list.
                let mut revisit = FetchItem::with_parent(url, -1, parent.item_id);
                revisit.item_id = existing_id;
                batch.push(revisit);
                continue;
            }
            if max_depth != -1 && i32::from(parent.depth) >= max_depth {
                continue;
            }
            if !self.handler.should_visit(page, &url).await {
                debug!("not visiting {url} as per the visit policy");
                continue;
            }
            if !self.robots.allows(&url).await {
                debug!("not visiting {url} as per the robots policy");
                continue;
            }
            batch.push(FetchItem::with_parent(url, parent.depth + 1, parent.item_id));
        }
        batch
    }
}

impl<H> std::fmt::Debug for Worker<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.worker_id)
            .field("options", &self.options)
            .field("stats", &self.stats)
            .finish()
    }
}

/// The middleware chain compiled from the URL-filter configuration.
fn candidate_middlewares(filters: &UrlFilters, page_url: &Url) -> Vec<Box<dyn Middleware>> {
    let mut chain: Vec<Box<dyn Middleware>> = vec![
        Box::new(DeduplicateMiddleware),
        Box::new(SchemeFilterMiddleware {
            skip_https: filters.skip_https,
            skip_ftp: filters.skip_ftp,
            skip_mailto: filters.skip_mailto,
        }),
    ];
    if filters.skip_images {
        chain.push(Box::new(ImageFilterMiddleware));
    }
    if filters.skip_outgoing_links {
        chain.push(Box::new(SiteFilterMiddleware::on_site(page_url.clone())));
    }
    chain.push(Box::new(LimitMiddleware::new(filters.max_outgoing_links)));
    chain
}
