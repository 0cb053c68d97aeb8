//! robots.txt tolerant parsing (spec.md §4.4 `robots_allows`, §8 S6).
//!
//! Grounded on `riptide-core/src/robots.rs`'s `RobotsManager`, which
//! uses the `robotstxt` crate's `DefaultMatcher`. The teacher's code
//! assumes valid UTF-8 input; spec.md §8 S6 requires tolerance of NUL
//! bytes and non-UTF-8 prefixes, so this module runs the raw bytes
//! through `String::from_utf8_lossy` before handing them to the parser
//! — a robustness step the teacher itself does not take (see
//! DESIGN.md).

use robotstxt::DefaultMatcher;

/// Whether `user_agent` may fetch `url` under `robots_txt`.
///
/// `robots_txt` is raw bytes so malformed/non-UTF-8 input can be
/// tolerated rather than rejected outright. `ignore_robots_txt` always
/// allows, per spec.md §4.4.
pub fn robots_allows(
    url: &str,
    robots_txt: Option<&[u8]>,
    user_agent: &str,
    ignore_robots_txt: bool,
) -> bool {
    if ignore_robots_txt {
        return true;
    }

    let Some(raw) = robots_txt else {
        // No robots.txt fetched (fetch failure is non-fatal per spec.md
        // §4.5) — default to allow.
        return true;
    };

    let text = String::from_utf8_lossy(raw);
    let sanitized: String = text.chars().filter(|c| *c != '\0').collect();

    let mut matcher = DefaultMatcher::default();
    matcher.one_agent_allowed_by_robots(&sanitized, user_agent, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_flag_always_allows() {
        assert!(robots_allows(
            "https://example.test/secret",
            Some(b"User-agent: *\nDisallow: /secret"),
            "crawlcore",
            true
        ));
    }

    #[test]
    fn missing_robots_txt_allows() {
        assert!(robots_allows("https://example.test/a", None, "crawlcore", false));
    }

    #[test]
    fn disallowed_path_is_denied() {
        let robots = b"User-agent: *\nDisallow: /private";
        assert!(!robots_allows(
            "https://example.test/private/page",
            Some(robots),
            "crawlcore",
            false
        ));
        assert!(robots_allows(
            "https://example.test/public",
            Some(robots),
            "crawlcore",
            false
        ));
    }

    #[test]
    fn malformed_non_utf8_robots_does_not_crash() {
        let mut malformed = vec![0u8, 0xFF, 0xFE, 0x00];
        malformed.extend_from_slice(b"User-agent: *\nDisallow: /blocked\n");
        assert!(robots_allows(
            "https://example.test/open",
            Some(&malformed),
            "crawlcore",
            false
        ));
        assert!(!robots_allows(
            "https://example.test/blocked",
            Some(&malformed),
            "crawlcore",
            false
        ));
    }
}
