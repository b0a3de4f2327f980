pub mod keys;
pub mod middleware;
pub mod urls;

pub use keys::{HostAddressKey, HostNameKey, UrlKey};
pub use middleware::{
    DeduplicateMiddleware, ImageFilterMiddleware, LimitMiddleware, Middleware,
    SchemeFilterMiddleware, SiteFilterMiddleware,
};
pub use urls::{domain_levels, domain_of, ensure_scheme, path_of, strip_query, UrlList};
