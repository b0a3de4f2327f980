//! Typed crawl configuration, loaded from YAML.
//!
//! Every section and field has a default, so a config file only needs to
//! name what it changes. `validate()` must pass before a session starts.
//!
//! ```yaml
//! crawler:
//!     storage_folder: /tmp/scurry
//!     politeness_delay_ms: 200
//!     max_depth: 3
//! runtime:
//!     max_threads: 7
//! agent:
//!     user_agent: scurry-bot
//! url_filters:
//!     skip_https: false
//! ```

use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlConfig {
    #[serde(default)]
    pub crawler: CrawlerSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub url_filters: UrlFilters,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerSection {
    /// Folder used for intermediate crawl data by the persistence layer.
    pub storage_folder: String,
    /// Whether a stopped/crashed crawl may be resumed by the persistence
    /// layer. The in-memory core carries the flag but does not act on it.
    pub resumable: bool,
    /// Minimum spacing between two successive requests, in milliseconds.
    pub politeness_delay_ms: u64,
    /// Pages larger than this many bytes are not fetched.
    pub max_download_size: usize,
    /// Maximum crawl depth, `-1` for unlimited.
    pub max_depth: i32,
    /// Maximum number of pages to schedule, `-1` for unlimited.
    pub max_pages: i64,
}

impl Default for CrawlerSection {
    fn default() -> Self {
        Self {
            storage_folder: String::new(),
            resumable: false,
            politeness_delay_ms: 200,
            max_download_size: 1_048_576,
            max_depth: -1,
            max_pages: -1,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    pub socket_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Delay between worker liveness checks.
    pub thread_monitoring_delay_secs: u64,
    /// Delay used to confirm the workers are really done.
    pub thread_shutdown_delay_secs: u64,
    /// Delay before final cleanup once the crawl looks finished.
    pub cleanup_delay_secs: u64,
    pub max_threads: usize,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            socket_timeout_ms: 20_000,
            connect_timeout_ms: 30_000,
            thread_monitoring_delay_secs: 10,
            thread_shutdown_delay_secs: 10,
            cleanup_delay_secs: 10,
            max_threads: 7,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSection {
    /// User-agent string presented to web servers.
    pub user_agent: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            user_agent: "scurry-bot".to_string(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UrlFilters {
    pub skip_https: bool,
    pub skip_images: bool,
    pub skip_redirects: bool,
    pub skip_ftp: bool,
    pub skip_mailto: bool,
    /// When set, links leaving the page's host are not followed.
    pub skip_outgoing_links: bool,
    /// Cap on links scheduled from a single page.
    pub max_outgoing_links: usize,
}

impl Default for UrlFilters {
    fn default() -> Self {
        Self {
            skip_https: true,
            skip_images: false,
            skip_redirects: false,
            skip_ftp: true,
            skip_mailto: true,
            skip_outgoing_links: false,
            max_outgoing_links: 5000,
        }
    }
}

impl CrawlConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path)?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!("loaded crawl config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Pre-flight validation. A config that fails here must not start a
    /// session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawler.storage_folder.trim().is_empty() {
            return Err(ConfigError::Validation(
                "crawl storage folder is not set".to_string(),
            ));
        }
        if self.crawler.max_depth < -1 {
            return Err(ConfigError::Validation(format!(
                "maximum crawl depth should be a positive number or -1 for unlimited, got {}",
                self.crawler.max_depth
            )));
        }
        if self.crawler.max_depth > i32::from(i16::MAX) {
            return Err(ConfigError::Validation(format!(
                "maximum value for crawl depth is {}",
                i16::MAX
            )));
        }
        if self.crawler.max_pages < -1 {
            return Err(ConfigError::Validation(format!(
                "maximum page count should be a positive number or -1 for unlimited, got {}",
                self.crawler.max_pages
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
crawler:
    storage_folder: /tmp/scurry-test
    politeness_delay_ms: 150
    max_depth: 3
runtime:
    max_threads: 2
agent:
    user_agent: test-bot/1.0
url_filters:
    skip_https: false
    max_outgoing_links: 10
"#;

    #[test]
    fn parses_yaml_with_defaults_for_missing_fields() {
        let config = CrawlConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.crawler.storage_folder, "/tmp/scurry-test");
        assert_eq!(config.crawler.politeness_delay_ms, 150);
        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.crawler.max_pages, -1);
        assert_eq!(config.runtime.max_threads, 2);
        assert_eq!(config.runtime.socket_timeout_ms, 20_000);
        assert_eq!(config.agent.user_agent, "test-bot/1.0");
        assert!(!config.url_filters.skip_https);
        assert_eq!(config.url_filters.max_outgoing_links, 10);
        config.validate().unwrap();
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = CrawlConfig::default();
        assert_eq!(config.crawler.politeness_delay_ms, 200);
        assert_eq!(config.crawler.max_download_size, 1_048_576);
        assert_eq!(config.crawler.max_depth, -1);
        assert_eq!(config.runtime.max_threads, 7);
        assert_eq!(config.agent.user_agent, "scurry-bot");
        assert!(config.url_filters.skip_https);
        assert!(!config.url_filters.skip_redirects);
    }

    #[test]
    fn validate_requires_storage_folder() {
        let config = CrawlConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn validate_bounds_max_depth() {
        let mut config = CrawlConfig::from_yaml_str(YAML).unwrap();
        config.crawler.max_depth = -2;
        assert!(config.validate().is_err());
        config.crawler.max_depth = i32::from(i16::MAX) + 1;
        assert!(config.validate().is_err());
        config.crawler.max_depth = -1;
        config.validate().unwrap();
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{YAML}").unwrap();

        let config = CrawlConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.runtime.max_threads, 2);
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = CrawlConfig::from_yaml_str("crawler:\n    storge_folder: typo\n");
        assert!(matches!(result, Err(ConfigError::YamlParse(_))));
    }
}
