//! Blocklist decision (spec.md §4.4 `is_blocked`).

use url::Url;

/// Compiled-once, process-shared blocklist tables (spec.md §9 "global
/// state ... compiled-once immutable policy tables").
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    /// Registrable domains / base domains that are blocked.
    pub entries: Vec<String>,
    /// Keywords that, if present anywhere in the URL, override a block.
    pub allowed_keywords: Vec<String>,
}

impl Blocklist {
    pub fn new(entries: Vec<String>, allowed_keywords: Vec<String>) -> Self {
        Self {
            entries,
            allowed_keywords,
        }
    }

    /// A URL is blocked if its host matches a blocklist entry exactly,
    /// is a subdomain of one, or shares a base domain with one across
    /// TLDs — unless the URL contains an allowed keyword. Invalid URLs
    /// are never blocked; downstream validators reject them instead
    /// (spec.md §4.4).
    pub fn is_blocked(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        if self
            .allowed_keywords
            .iter()
            .any(|kw| url.to_ascii_lowercase().contains(&kw.to_ascii_lowercase()))
        {
            return false;
        }

        self.entries.iter().any(|entry| {
            let entry = entry.to_ascii_lowercase();
            host == entry
                || host.ends_with(&format!(".{entry}"))
                || base_domain(&host) == base_domain(&entry)
        })
    }
}

/// Registrable-domain-ish approximation: last two labels. A real
/// deployment would consult the public suffix list; this spec treats
/// base-domain matching as a policy-table concern outside the core.
fn base_domain(host: &str) -> String {
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

    #[test]
    fn exact_domain_match_is_blocked() {
        let bl = Blocklist::new(vec!["bad.test".into()], vec![]);
        assert!(bl.is_blocked("https://bad.test/page"));
    }

    #[test]
    fn subdomain_is_blocked() {
        let bl = Blocklist::new(vec!["bad.test".into()], vec![]);
        assert!(bl.is_blocked("https://www.bad.test/page"));
    }

    #[test]
    fn allowed_keyword_overrides_block() {
        let bl = Blocklist::new(vec!["bad.test".into()], vec!["legal".into()]);
        assert!(!bl.is_blocked("https://bad.test/legal/terms"));
    }

    #[test]
    fn unrelated_domain_not_blocked() {
        let bl = Blocklist::new(vec!["bad.test".into()], vec![]);
        assert!(!bl.is_blocked("https://good.test/page"));
    }

    #[test]
    fn invalid_url_is_not_blocked() {
        let bl = Blocklist::new(vec!["bad.test".into()], vec![]);
        assert!(!bl.is_blocked("not a url"));
    }
}
