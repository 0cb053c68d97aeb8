//! Crawl-scope decision (spec.md §4.4 `matches_crawl_scope`).

use regex::Regex;
use url::Url;

use crawlcore_types::model::CrawlOptions;

use crate::normalize::depth_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDecision {
    Allow,
    DenyExternal,
    DenyPath,
    DenyDepth,
    DenyBackward,
    DenySubdomain,
}

/// Applies the seven ordered rules of spec.md §4.4 to decide whether
/// `url` is in scope for a crawl seeded at `seed`.
///
/// `discovery_depth` is the hop count from the seed via discovered
/// links, distinct from URL path depth (spec.md Glossary).
pub fn matches_crawl_scope(
    url: &str,
    seed: &str,
    options: &CrawlOptions,
    discovery_depth: u32,
) -> ScopeDecision {
    let (Ok(url_parsed), Ok(seed_parsed)) = (Url::parse(url), Url::parse(seed)) else {
        return ScopeDecision::DenyPath;
    };

    let url_host = url_parsed.host_str().unwrap_or_default();
    let seed_host = seed_parsed.host_str().unwrap_or_default();

    // 1. external domain
    if !options.allow_external_links && registrable_domain(url_host) != registrable_domain(seed_host) {
        return ScopeDecision::DenyExternal;
    }

    // 2. subdomain
    if !options.allow_subdomains && url_host != seed_host {
        return ScopeDecision::DenySubdomain;
    }

    // 3. include_paths
    if !options.include_paths.is_empty() {
        let subject = if options.regex_on_full_url {
            url
        } else {
            url_parsed.path()
        };
        let matched = options
            .include_paths
            .iter()
            .any(|pattern| Regex::new(pattern).map(|re| re.is_match(subject)).unwrap_or(false));
        if !matched {
            return ScopeDecision::DenyPath;
        }
    }

    // 4. exclude_paths
    if !options.exclude_paths.is_empty() {
        let subject = if options.regex_on_full_url {
            url
        } else {
            url_parsed.path()
        };
        let excluded = options
            .exclude_paths
            .iter()
            .any(|pattern| Regex::new(pattern).map(|re| re.is_match(subject)).unwrap_or(false));
        if excluded {
            return ScopeDecision::DenyPath;
        }
    }

    // 5. backward links / descendant-of-seed-path
    if !options.allow_backward_links && !is_descendant_path(url_parsed.path(), seed_parsed.path()) {
        return ScopeDecision::DenyBackward;
    }

    // 6. path depth
    let depth = depth_of(url, seed);
    if depth > options.max_depth {
        return ScopeDecision::DenyDepth;
    }

    // 7. discovery depth
    if discovery_depth > options.max_discovery_depth {
        return ScopeDecision::DenyDepth;
    }

    ScopeDecision::Allow
}

fn is_descendant_path(path: &str, seed_path: &str) -> bool {
    let seed_trimmed = seed_path.trim_end_matches('/');
    if seed_trimmed.is_empty() {
        return true;
    }
    path == seed_trimmed || path.starts_with(&format!("{seed_trimmed}/"))
}

fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host.to_string()
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> CrawlOptions {
        CrawlOptions::default()
    }

    #[test]
    fn external_domain_denied_by_default() {
        let decision = matches_crawl_scope(
            "https://other.test/a",
            "https://example.test/",
            &opts(),
            1,
        );
        assert_eq!(decision, ScopeDecision::DenyExternal);
    }

    #[test]
    fn subdomain_denied_by_default() {
        let decision = matches_crawl_scope(
            "https://blog.example.test/a",
            "https://example.test/",
            &opts(),
            1,
        );
        assert_eq!(decision, ScopeDecision::DenySubdomain);
    }

    #[test]
    fn depth_limit_enforced() {
        let mut o = opts();
        o.max_depth = 0;
        let decision = matches_crawl_scope("https://example.test/a", "https://example.test/", &o, 1);
        assert_eq!(decision, ScopeDecision::DenyDepth);
    }

    #[test]
    fn include_path_regex_full_url() {
        let mut o = opts();
        o.include_paths = vec!["^/pricing$".into()];
        o.regex_on_full_url = false;
        let allowed = matches_crawl_scope("https://example.test/pricing", "https://example.test/", &o, 1);
        assert_eq!(allowed, ScopeDecision::Allow);
        let denied = matches_crawl_scope("https://example.test/pricing/plans", "https://example.test/", &o, 1);
        assert_eq!(denied, ScopeDecision::DenyPath);
    }

    #[test]
    fn backward_link_denied_by_default() {
        let decision = matches_crawl_scope(
            "https://example.test/other",
            "https://example.test/pages/",
            &opts(),
            1,
        );
        assert_eq!(decision, ScopeDecision::DenyBackward);
    }
}
