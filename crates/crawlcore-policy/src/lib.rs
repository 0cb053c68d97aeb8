//! URL Policy (spec.md §4.4): normalization, blocklist, robots.txt,
//! crawl-scope matching, and sitemap discovery.

pub mod blocklist;
pub mod normalize;
pub mod robots;
pub mod scope;
pub mod sitemap;

pub use blocklist::Blocklist;
pub use normalize::{depth_of, normalize};
pub use robots::robots_allows;
pub use scope::{matches_crawl_scope, ScopeDecision};
pub use sitemap::{parse_sitemap_urls, SitemapFetcher};
