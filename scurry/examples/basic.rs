//! Crawl a site two levels deep and print every visited page.
//!
//! ```sh
//! cargo run --example basic -- http://example.com/
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use scurry::{CrawlConfig, CrawlHandler, CrawlSession, Page};

struct PrintingHandler;

#[async_trait]
impl CrawlHandler for PrintingHandler {
    async fn should_visit(&self, page: &Page, url: &Url) -> bool {
        // Stay on the seed's host.
        url.host_str() == page.item.url.host_str()
    }

    async fn visit(&self, page: &Page) {
        let links = page
            .parse
            .as_ref()
            .map(|parse| parse.outgoing_urls.len())
            .unwrap_or(0);
        println!("{} [{}] {} links", page.item.url, page.status_code, links);
    }

    async fn on_unexpected_status(
        &self,
        url: &Url,
        status_code: u16,
        _content_type: Option<&str>,
        reason: Option<&str>,
    ) {
        println!("{url} [{status_code}] {}", reason.unwrap_or("?"));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let seed = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://example.com/".to_string());

    let mut config = CrawlConfig::default();
    config.crawler.storage_folder = std::env::temp_dir().join("scurry").display().to_string();
    config.crawler.max_depth = 2;
    config.url_filters.skip_https = false;

    let session = Arc::new(CrawlSession::with_defaults(config)?);
    session.add_seed(&seed)?;
    session.start(|| PrintingHandler, 4, true).await;
    Ok(())
}
