//! URL normalization (spec.md §4.4 `normalize`).

use url::Url;

/// Lower-cases scheme/host, strips the default port for the scheme,
/// optionally strips query parameters, and resolves `.`/`..` segments.
/// Trailing slash is preserved exactly as given — it is semantically
/// load-bearing for depth computation (spec.md §4.4 edge cases).
pub fn normalize(raw: &str, strip_query: bool) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;

    let _ = url.set_scheme(&url.scheme().to_ascii_lowercase());

    if let Some(host) = url.host_str() {
        let lower = host.to_ascii_lowercase();
        let _ = url.set_host(Some(&lower));
    }

    if is_default_port(url.scheme(), url.port()) {
        let _ = url.set_port(None);
    }

    if strip_query {
        url.set_query(None);
    }

    // `Url` already collapses `.`/`..` segments during parsing per the
    // WHATWG URL spec, so no further path resolution is needed here.

    Some(url.to_string())
}

fn is_default_port(scheme: &str, port: Option<u16>) -> bool {
    match (scheme, port) {
        ("http", Some(80)) => true,
        ("https", Some(443)) => true,
        _ => false,
    }
}

/// Number of non-empty path segments, used both for `normalize`'s
/// idempotence property and for depth computation (spec.md §4.4).
pub fn path_segments(raw: &str) -> Vec<String> {
    Url::parse(raw)
        .ok()
        .map(|u| {
            u.path_segments()
                .map(|segs| segs.filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default()
        })
        .unwrap_or_default()
}

/// Depth of `url` relative to `seed`: count of non-empty path segments
/// beyond the seed's own segments (spec.md §4.4: `/` is depth 0, `/a`
/// and `/a/` are both depth 1).
pub fn depth_of(url: &str, seed: &str) -> u32 {
    let seed_segs = path_segments(seed).len();
    let url_segs = path_segments(url).len();
    url_segs.saturating_sub(seed_segs) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_normalization() {
        let once = normalize("HTTP://Example.TEST:80/a/../b?x=1", false).unwrap();
        let twice = normalize(&once, false).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_default_http_port() {
        let n = normalize("http://example.test:80/a", false).unwrap();
        assert_eq!(n, "http://example.test/a");
    }

    #[test]
    fn keeps_non_default_port() {
        let n = normalize("http://example.test:8080/a", false).unwrap();
        assert_eq!(n, "http://example.test:8080/a");
    }

    #[test]
    fn strips_query_when_requested() {
        let n = normalize("https://example.test/a?x=1&y=2", true).unwrap();
        assert_eq!(n, "https://example.test/a");
    }

    #[test]
    fn preserves_trailing_slash() {
        let with_slash = normalize("https://example.test/a/", false).unwrap();
        let without_slash = normalize("https://example.test/a", false).unwrap();
        assert!(with_slash.ends_with('/'));
        assert!(!without_slash.ends_with('/'));
    }

    #[test]
    fn seed_root_is_depth_zero() {
        assert_eq!(depth_of("https://example.test/", "https://example.test/"), 0);
    }

    #[test]
    fn single_segment_is_depth_one_with_or_without_trailing_slash() {
        assert_eq!(depth_of("https://example.test/a", "https://example.test/"), 1);
        assert_eq!(depth_of("https://example.test/a/", "https://example.test/"), 1);
    }
}
