//! The supervising crawl session.
//!
//! Owns the queue and the fetch client, spawns the worker pool, and runs
//! the monitor loop: dead workers are replaced while the session is not
//! shutting down, and terminal quiescence (no worker alive, no work
//! pending, confirmed across consecutive monitoring intervals) flips the
//! one-shot `finished` signal that releases blocked callers.

use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use derive_builder::Builder;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, Instrument};
use url::Url;

use scurry_config::{ConfigError, CrawlConfig};
use scurry_queue::{FetchItem, FetchQueue};
use scurry_urls::{ensure_scheme, HostAddressKey, UrlKey};

use crate::crawl::handler::CrawlHandler;
use crate::crawl::worker::{Worker, WorkerId, WorkerOptions};
use crate::fetcher::Fetcher;
use crate::parser::{ContentParser, LinkExtractor};
use crate::robots::{AllowAll, RobotsPolicy};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("couldn't create the storage folder {path}: {source}")]
    Storage {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid seed url: {0}")]
    Seed(#[from] url::ParseError),
}

#[derive(Builder, Clone, Debug)]
#[builder(public, setter(into))]
pub struct SupervisorOptions {
    /// Interval between worker liveness scans.
    #[builder(default = "Duration::from_secs(10)")]
    pub monitor_delay: Duration,
    /// Debounce window for confirming the workers are really done.
    #[builder(default = "Duration::from_secs(10)")]
    pub shutdown_delay: Duration,
    /// Grace period before final cleanup once the crawl looks finished.
    #[builder(default = "Duration::from_secs(10)")]
    pub cleanup_delay: Duration,
    #[builder(default)]
    pub worker_options: WorkerOptions,
}

impl SupervisorOptions {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            monitor_delay: Duration::from_secs(config.runtime.thread_monitoring_delay_secs),
            shutdown_delay: Duration::from_secs(config.runtime.thread_shutdown_delay_secs),
            cleanup_delay: Duration::from_secs(config.runtime.cleanup_delay_secs),
            worker_options: WorkerOptions::default(),
        }
    }
}

/// Everything a worker needs; cloned into the monitor so replacements can
/// be wired exactly like the originals.
#[derive(Clone)]
struct WorkerContext {
    config: Arc<CrawlConfig>,
    queue: Arc<FetchQueue>,
    fetcher: Arc<Fetcher>,
    parser: Arc<dyn ContentParser>,
    robots: Arc<dyn RobotsPolicy>,
    shutting_down: Arc<AtomicBool>,
    worker_options: WorkerOptions,
}

pub struct CrawlSession {
    config: Arc<CrawlConfig>,
    queue: Arc<FetchQueue>,
    fetcher: Arc<Fetcher>,
    parser: Arc<dyn ContentParser>,
    robots: Arc<dyn RobotsPolicy>,
    shutting_down: Arc<AtomicBool>,
    finished_tx: watch::Sender<bool>,
    options: SupervisorOptions,
}

impl CrawlSession {
    /// Build a session with monitor timings taken from the config.
    pub fn new(
        config: CrawlConfig,
        parser: Arc<dyn ContentParser>,
        robots: Arc<dyn RobotsPolicy>,
        keyer: Arc<dyn UrlKey>,
    ) -> Result<Self, SessionError> {
        let options = SupervisorOptions::from_config(&config);
        Self::with_options(config, parser, robots, keyer, options)
    }

    /// Build a session with the default parser, robots policy, and
    /// canonical-key strategy.
    pub fn with_defaults(config: CrawlConfig) -> Result<Self, SessionError> {
        let parser = Arc::new(LinkExtractor::new(&config.url_filters));
        Self::new(config, parser, Arc::new(AllowAll), Arc::new(HostAddressKey))
    }

    pub fn with_options(
        config: CrawlConfig,
        parser: Arc<dyn ContentParser>,
        robots: Arc<dyn RobotsPolicy>,
        keyer: Arc<dyn UrlKey>,
        options: SupervisorOptions,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let folder = Path::new(&config.crawler.storage_folder);
        if !folder.exists() {
            fs::create_dir_all(folder).map_err(|source| SessionError::Storage {
                path: folder.display().to_string(),
                source,
            })?;
            debug!("created storage folder {}", folder.display());
        }

        let queue = Arc::new(FetchQueue::new(
            keyer,
            Duration::from_millis(config.crawler.politeness_delay_ms),
            config.runtime.max_threads,
            config.crawler.max_pages,
        ));
        let fetcher = Arc::new(Fetcher::new(&config)?);
        let (finished_tx, _) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            queue,
            fetcher,
            parser,
            robots,
            shutting_down: Arc::new(AtomicBool::new(false)),
            finished_tx,
            options,
        })
    }

    /// Schedule a seed URL at depth 0. Returns whether it was accepted
    /// (an already-seen seed is a no-op).
    pub fn add_seed(&self, url: &str) -> Result<bool, SessionError> {
        let parsed = Url::parse(&ensure_scheme(url))?;
        Ok(self.queue.enqueue(FetchItem::new(parsed, 0)))
    }

    pub fn add_seeds<'a>(
        &self,
        urls: impl IntoIterator<Item = &'a str>,
    ) -> Result<usize, SessionError> {
        let mut accepted = 0;
        for url in urls {
            if self.add_seed(url)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Start `worker_count` workers, each with a handler produced by
    /// `factory`, plus the monitor task. When `blocking`, the call returns
    /// only once the session reaches terminal quiescence.
    pub async fn start<H, F>(&self, factory: F, worker_count: usize, blocking: bool)
    where
        H: CrawlHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.finished_tx.send_replace(false);

        let context = WorkerContext {
            config: self.config.clone(),
            queue: self.queue.clone(),
            fetcher: self.fetcher.clone(),
            parser: self.parser.clone(),
            robots: self.robots.clone(),
            shutting_down: self.shutting_down.clone(),
            worker_options: self.options.worker_options.clone(),
        };

        let mut handles = Vec::with_capacity(worker_count);
        for ordinal in 1..=worker_count {
            handles.push(spawn_worker(&context, ordinal, factory()));
            info!("crawler {ordinal} started");
        }

        let options = self.options.clone();
        let finished_tx = self.finished_tx.clone();
        tokio::spawn(async move {
            monitor_loop(context, handles, factory, options, finished_tx).await;
        });

        if blocking {
            self.wait_until_finish().await;
        }
    }

    /// Signal shutdown: workers stop before starting new fetches, the
    /// fetch client closes eagerly, and the monitor still runs the finished
    /// transition to release blocked callers.
    pub fn shutdown(&self) {
        info!("shutting down the crawl session...");
        self.shutting_down.store(true, Ordering::SeqCst);
        self.fetcher.shutdown();
    }

    /// Block until this crawl session finishes. Any number of callers may
    /// wait; all are released by the monitor's broadcast.
    pub async fn wait_until_finish(&self) {
        let mut finished_rx = self.finished_tx.subscribe();
        // The sender lives in `self`, so this cannot error while borrowed.
        let _ = finished_rx.wait_for(|finished| *finished).await;
    }

    pub fn is_finished(&self) -> bool {
        *self.finished_tx.borrow()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn queue(&self) -> &Arc<FetchQueue> {
        &self.queue
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }
}

fn spawn_worker<H: CrawlHandler>(
    context: &WorkerContext,
    ordinal: usize,
    handler: H,
) -> JoinHandle<()> {
    let worker = Worker::new(
        WorkerId::new(ordinal),
        context.config.clone(),
        context.queue.clone(),
        context.fetcher.clone(),
        context.parser.clone(),
        context.robots.clone(),
        handler,
        context.shutting_down.clone(),
        context.worker_options.clone(),
    );
    let span = tracing::info_span!("worker", worker_id = %ordinal);
    tokio::spawn(worker.run().instrument(span))
}

/// The monitor: scans liveness every `monitor_delay`, replaces dead workers
/// unless the session is shutting down, and drives the quiescence protocol.
/// This task is the only writer of the `finished` signal.
async fn monitor_loop<H, F>(
    context: WorkerContext,
    mut handles: Vec<JoinHandle<()>>,
    factory: F,
    options: SupervisorOptions,
    finished_tx: watch::Sender<bool>,
) where
    H: CrawlHandler,
    F: Fn() -> H + Send + Sync + 'static,
{
    loop {
        tokio::time::sleep(options.monitor_delay).await;

        // Replacements deliberately do not count as alive this round: the
        // quiescence path below must observe the pre-respawn state.
        let mut any_alive = false;
        for slot in 0..handles.len() {
            if !handles[slot].is_finished() {
                any_alive = true;
            } else if !context.shutting_down.load(Ordering::SeqCst) {
                let ordinal = slot + 1;
                info!("crawler {ordinal} is gone, starting a replacement");
                handles[slot] = spawn_worker(&context, ordinal, factory());
            }
        }
        if any_alive {
            continue;
        }

        // Debounce: a replacement spawned above may be about to pick up
        // work, or a worker may have exited a heartbeat ago by accident.
        tokio::time::sleep(options.shutdown_delay).await;
        if handles.iter().any(|handle| !handle.is_finished()) {
            continue;
        }

        if !context.shutting_down.load(Ordering::SeqCst) {
            if !context.queue.is_empty() {
                // Work remains; the scan above respawns the pool next round.
                continue;
            }
            // Rule out a race with in-flight link scheduling.
            tokio::time::sleep(options.shutdown_delay).await;
            if !context.queue.is_empty() {
                continue;
            }
        }

        tokio::time::sleep(options.cleanup_delay).await;
        context.fetcher.shutdown();
        finished_tx.send_replace(true);
        info!("crawl session finished");
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::handler::DefaultHandler;
    use std::sync::atomic::AtomicUsize;

    fn test_config(dir: &Path) -> CrawlConfig {
        let mut config = CrawlConfig::default();
        config.crawler.storage_folder = dir.display().to_string();
        config.crawler.politeness_delay_ms = 0;
        config.runtime.max_threads = 2;
        config
    }

    fn fast_options() -> SupervisorOptions {
        SupervisorOptionsBuilder::default()
            .monitor_delay(Duration::from_millis(50))
            .shutdown_delay(Duration::from_millis(50))
            .cleanup_delay(Duration::from_millis(10))
            .worker_options(
                crate::crawl::worker::WorkerOptionsBuilder::default()
                    .idle_backoff(Duration::from_millis(20))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn session(dir: &Path) -> CrawlSession {
        let config = test_config(dir);
        let parser = Arc::new(LinkExtractor::new(&config.url_filters));
        CrawlSession::with_options(
            config,
            parser,
            Arc::new(AllowAll),
            Arc::new(scurry_urls::HostNameKey),
            fast_options(),
        )
        .unwrap()
    }

    struct ErrorCounting {
        errors: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl CrawlHandler for ErrorCounting {
        async fn on_unhandled_error(&self, _url: &Url, _error: &anyhow::Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn missing_storage_folder_fails_validation() {
        let config = CrawlConfig::default();
        let parser = Arc::new(LinkExtractor::new(&config.url_filters));
        let result = CrawlSession::with_options(
            config,
            parser,
            Arc::new(AllowAll),
            Arc::new(scurry_urls::HostNameKey),
            fast_options(),
        );
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn storage_folder_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("crawl/data");
        let mut config = CrawlConfig::default();
        config.crawler.storage_folder = nested.display().to_string();
        let parser = Arc::new(LinkExtractor::new(&config.url_filters));
        CrawlSession::with_options(
            config,
            parser,
            Arc::new(AllowAll),
            Arc::new(scurry_urls::HostNameKey),
            fast_options(),
        )
        .unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn empty_crawl_reaches_quiescence() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        session.start(|| DefaultHandler, 2, true).await;
        assert!(session.is_finished());
        assert!(session.fetcher().is_closed());
    }

    #[tokio::test]
    async fn unreachable_seeds_drain_through_the_error_path() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        // Nothing listens on port 1; every fetch fails fast with a
        // transport error, which is unhandled-exception class.
        for path in ["a", "b", "c"] {
            assert!(session.add_seed(&format!("http://127.0.0.1:1/{path}")).unwrap());
        }

        let errors = Arc::new(AtomicUsize::new(0));
        let factory_errors = errors.clone();
        session
            .start(
                move || ErrorCounting {
                    errors: factory_errors.clone(),
                },
                2,
                true,
            )
            .await;

        assert!(session.is_finished());
        assert_eq!(errors.load(Ordering::SeqCst), 3);
        assert_eq!(session.queue().len(), 0);
        assert_eq!(session.queue().in_progress(), 0);
    }

    struct PanicOnce {
        fuse: Arc<AtomicBool>,
        starts: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl CrawlHandler for PanicOnce {
        async fn on_start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fuse.swap(false, Ordering::SeqCst) {
                panic!("simulated worker crash");
            }
        }
    }

    #[tokio::test]
    async fn crashed_worker_is_replaced_and_the_crawl_still_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        for path in ["x", "y", "z", "w"] {
            session.add_seed(&format!("http://127.0.0.1:1/{path}")).unwrap();
        }

        let fuse = Arc::new(AtomicBool::new(true));
        let starts = Arc::new(AtomicUsize::new(0));
        let (factory_fuse, factory_starts) = (fuse.clone(), starts.clone());
        session
            .start(
                move || PanicOnce {
                    fuse: factory_fuse.clone(),
                    starts: factory_starts.clone(),
                },
                1,
                true,
            )
            .await;

        assert!(session.is_finished());
        // The crashed worker was replaced: more starts than initial slots.
        assert!(starts.load(Ordering::SeqCst) >= 2);
        assert_eq!(session.queue().len(), 0);
    }

    #[tokio::test]
    async fn shutdown_releases_blocked_callers_without_draining() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        // A noticeable inter-request delay keeps most of the queue
        // untouched by the time shutdown lands.
        config.crawler.politeness_delay_ms = 300;
        let parser = Arc::new(LinkExtractor::new(&config.url_filters));
        let session = Arc::new(
            CrawlSession::with_options(
                config,
                parser,
                Arc::new(AllowAll),
                Arc::new(scurry_urls::HostNameKey),
                fast_options(),
            )
            .unwrap(),
        );
        for i in 0..5 {
            session.add_seed(&format!("http://127.0.0.1:1/{i}")).unwrap();
        }

        session.start(|| DefaultHandler, 2, false).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.shutdown();
        session.wait_until_finish().await;

        assert!(session.is_finished());
        assert!(session.fetcher().is_closed());
        // Queued items beyond the in-flight ones were never processed.
        assert!(session.queue().len() > 0);
        assert_eq!(session.queue().in_progress(), 0);
    }
}
