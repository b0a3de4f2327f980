//! HTTP client construction for the fetch layer.
//!
//! The client is deliberately built with redirects disabled: the crawl loop
//! must see 3xx responses and decide whether the target gets scheduled, the
//! same way any discovered link does.

use std::time::Duration;

use crate::config::CrawlConfig;

/// Idle pooled connections are reaped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Parameters for building the crawl HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientParams<'a> {
    pub socket_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub user_agent: &'a str,
}

impl<'a> HttpClientParams<'a> {
    pub fn from_config(config: &'a CrawlConfig) -> Self {
        Self {
            socket_timeout_ms: config.runtime.socket_timeout_ms,
            connect_timeout_ms: config.runtime.connect_timeout_ms,
            user_agent: &config.agent.user_agent,
        }
    }
}

/// Builds the pooled HTTP client used by the fetcher: rustls, timeouts,
/// user agent, no automatic redirects, idle-connection reaping.
pub fn build_http_client(params: HttpClientParams) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_millis(params.socket_timeout_ms))
        .connect_timeout(Duration::from_millis(params.connect_timeout_ms))
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .user_agent(params.user_agent)
        .build()
}
