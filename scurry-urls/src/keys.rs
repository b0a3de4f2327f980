//! Canonical dedup keys for URLs.
//!
//! A canonical key identifies a URL for at-most-once scheduling:
//! `scheme://host-identity/path`, where the host identity is derived by a
//! pluggable strategy. Query strings and fragments never participate in the
//! key, so `?utm_source=` noise collapses onto one document.

use std::net::ToSocketAddrs;

use tracing::debug;
use url::Url;

/// Strategy for deriving the canonical dedup key of a URL.
///
/// Returns `None` for URLs that carry no host (e.g. `mailto:`), which are
/// not schedulable.
pub trait UrlKey: Send + Sync {
    fn canonical_key(&self, url: &Url) -> Option<String>;
}

/// Keys URLs by the resolved address of their host, so two spellings of a
/// hostname that point at the same address collapse onto one key.
///
/// When the host does not resolve, the lowercased hostname is used instead:
/// dedup still works per spelling and the fetch layer reports the real DNS
/// failure when the item is actually requested.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAddressKey;

impl UrlKey for HostAddressKey {
    fn canonical_key(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let identity = match (host, 0u16).to_socket_addrs() {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => addr.ip().to_string(),
                None => host.to_lowercase(),
            },
            Err(err) => {
                debug!("unable to resolve {host}: {err}, keying by hostname");
                host.to_lowercase()
            }
        };
        Some(format!("{}://{}{}", url.scheme(), identity, url.path()))
    }
}

/// Keys URLs by their lowercased hostname, without touching the resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostNameKey;

impl UrlKey for HostNameKey {
    fn canonical_key(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        Some(format!(
            "{}://{}{}",
            url.scheme(),
            host.to_lowercase(),
            url.path()
        ))
    }
}
