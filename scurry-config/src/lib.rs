pub mod config;
pub mod http;

pub use config::{
    AgentSection, ConfigError, CrawlConfig, CrawlerSection, RuntimeSection, UrlFilters,
};
pub use http::{build_http_client, HttpClientParams};
