//! Request validation (spec.md §4.10): "`waitFor ≤ timeout/2`; screenshot
//! viewport dimensions must be positive integers ≤ 7680×4320; unknown
//! format types rejected with 400; systemPrompt forbidden on certain
//! extract configurations; URLs must include a valid TLD or be
//! otherwise well-formed; zero-data-retention only if team flags
//! allow."
//!
//! Grounded on `riptide-api/src/validation.rs`'s shape: small, single-
//! purpose `validate_*` functions returning `ApiResult<()>` or a built
//! value, called in sequence from the handler before anything touches
//! the core.

use std::collections::HashMap;

use crawlcore_types::model::{Action, CrawlOptions, Format, ScrapeOptions, Viewport};
use crawlcore_types::ports::external::{normalize_action_shorthand, normalize_format_shorthand, AuthContext};

use crate::errors::{ApiError, ApiResult};
use crate::models::{CrawlOptionsBody, ScrapeOptionsBody};

pub const MAX_URLS_PER_BATCH: usize = 10_000;
pub const MAX_VIEWPORT_WIDTH: u32 = 7680;
pub const MAX_VIEWPORT_HEIGHT: u32 = 4320;
pub const MAX_QUERY_LENGTH: usize = 1_000;
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Rejects URLs with no scheme, no host, or a host with no recognizable
/// TLD (a bare `localhost`-style host is accepted only when it carries
/// a port, matching typical same-box test setups).
pub fn validate_url(raw: &str) -> ApiResult<()> {
    let url = url::Url::parse(raw)
        .map_err(|_| ApiError::validation(format!("not a well-formed URL: {raw}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ApiError::validation(format!(
            "unsupported scheme '{}': only http/https are allowed",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| ApiError::validation("URL has no host"))?;

    let looks_like_ip = host.parse::<std::net::IpAddr>().is_ok();
    let has_tld = host.rsplit_once('.').is_some_and(|(_, tld)| tld.len() >= 2);

    if !looks_like_ip && !has_tld && url.port().is_none() {
        return Err(ApiError::validation(format!(
            "URL host '{host}' has no valid TLD"
        )));
    }

    Ok(())
}

pub fn validate_urls(urls: &[String]) -> ApiResult<()> {
    if urls.is_empty() {
        return Err(ApiError::validation("at least one URL is required"));
    }
    if urls.len() > MAX_URLS_PER_BATCH {
        return Err(ApiError::validation(format!(
            "too many URLs: {} exceeds the limit of {MAX_URLS_PER_BATCH}",
            urls.len()
        )));
    }
    for url in urls {
        validate_url(url)?;
    }
    Ok(())
}

pub fn validate_search_query(query: &str) -> ApiResult<()> {
    if query.trim().is_empty() {
        return Err(ApiError::validation("query must not be empty"));
    }
    if query.len() > MAX_QUERY_LENGTH {
        return Err(ApiError::validation(format!(
            "query exceeds the maximum length of {MAX_QUERY_LENGTH}"
        )));
    }
    Ok(())
}

pub fn validate_search_limit(limit: Option<u32>) -> ApiResult<u32> {
    match limit {
        None => Ok(10),
        Some(0) => Err(ApiError::validation("limit must be at least 1")),
        Some(n) if n > MAX_SEARCH_LIMIT => Err(ApiError::validation(format!(
            "limit {n} exceeds the maximum of {MAX_SEARCH_LIMIT}"
        ))),
        Some(n) => Ok(n),
    }
}

fn build_format(raw: &serde_json::Value, json_schema: Option<&serde_json::Value>) -> ApiResult<Format> {
    match raw {
        serde_json::Value::String(s) => normalize_format_shorthand(s)
            .map(|fmt| match (fmt, json_schema) {
                (Format::Json { .. }, Some(schema)) => Format::Json {
                    schema: Some(schema.clone()),
                },
                (fmt, _) => fmt,
            })
            .ok_or_else(|| ApiError::validation(format!("unknown format type '{s}'"))),
        serde_json::Value::Object(obj) => {
            let type_name = obj
                .get("type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ApiError::validation("format object missing 'type'"))?;
            if type_name == "json" {
                let schema = obj.get("schema").cloned().or_else(|| json_schema.cloned());
                Ok(Format::Json { schema })
            } else {
                normalize_format_shorthand(type_name)
                    .ok_or_else(|| ApiError::validation(format!("unknown format type '{type_name}'")))
            }
        }
        _ => Err(ApiError::validation("format entries must be strings or objects")),
    }
}

fn build_action(raw: &serde_json::Value) -> ApiResult<Action> {
    match raw {
        serde_json::Value::String(s) => normalize_action_shorthand(s)
            .ok_or_else(|| ApiError::validation(format!("unknown action type '{s}'"))),
        serde_json::Value::Object(obj) => {
            let type_name = obj
                .get("type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ApiError::validation("action object missing 'type'"))?;
            match type_name {
                "wait" => {
                    let ms = obj.get("ms").and_then(|v| v.as_u64()).unwrap_or(1_000);
                    Ok(Action::Wait { ms })
                }
                "click" => {
                    let selector = obj
                        .get("selector")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| ApiError::validation("click action missing 'selector'"))?;
                    Ok(Action::Click {
                        selector: selector.to_string(),
                    })
                }
                "scroll" => {
                    let ms = obj.get("ms").and_then(|v| v.as_u64()).unwrap_or(500);
                    Ok(Action::Scroll { ms })
                }
                "screenshot" => Ok(Action::Screenshot),
                other => Err(ApiError::validation(format!("unknown action type '{other}'"))),
            }
        }
        _ => Err(ApiError::validation("action entries must be strings or objects")),
    }
}

/// Normalizes and validates a wire `ScrapeOptionsBody` into the core's
/// canonical `ScrapeOptions`.
pub fn build_scrape_options(body: &ScrapeOptionsBody) -> ApiResult<ScrapeOptions> {
    if body.wait_for > 0 && body.wait_for * 2 > body.timeout {
        return Err(ApiError::validation("waitFor must be at most half of timeout"));
    }

    let formats = if body.formats.is_empty() {
        vec![Format::Markdown]
    } else {
        body.formats
            .iter()
            .map(|raw| build_format(&serde_json::Value::String(raw.clone()), body.json_schema.as_ref()))
            .collect::<ApiResult<Vec<_>>>()?
    };

    let all_json = formats.iter().all(|f| matches!(f, Format::Json { .. }));
    if body.system_prompt.is_some() && !all_json {
        return Err(ApiError::validation(
            "systemPrompt is only allowed when every requested format is 'json'",
        ));
    }

    let viewport = match &body.viewport {
        Some(v) => {
            if v.width == 0 || v.height == 0 {
                return Err(ApiError::validation("viewport dimensions must be positive"));
            }
            if v.width > MAX_VIEWPORT_WIDTH || v.height > MAX_VIEWPORT_HEIGHT {
                return Err(ApiError::validation(format!(
                    "viewport {}x{} exceeds the maximum of {MAX_VIEWPORT_WIDTH}x{MAX_VIEWPORT_HEIGHT}",
                    v.width, v.height
                )));
            }
            Some(Viewport {
                width: v.width,
                height: v.height,
            })
        }
        None => None,
    };

    let actions = body
        .actions
        .iter()
        .map(build_action)
        .collect::<ApiResult<Vec<_>>>()?;

    let proxy = match body.proxy.as_deref() {
        None | Some("basic") => crawlcore_types::model::ProxyMode::Basic,
        Some("stealth") => crawlcore_types::model::ProxyMode::Stealth,
        Some(other) => return Err(ApiError::validation(format!("unknown proxy mode '{other}'"))),
    };

    Ok(ScrapeOptions {
        formats,
        wait_for_ms: body.wait_for,
        timeout_ms: body.timeout,
        mobile: body.mobile,
        proxy,
        headers: body.headers.clone(),
        location: body.location.clone(),
        max_age_ms: body.max_age,
        viewport,
        actions,
        skip_tls_verification: body.skip_tls_verification,
    })
}

pub fn build_crawl_options(body: &CrawlOptionsBody) -> ApiResult<CrawlOptions> {
    let defaults = CrawlOptions::default();
    Ok(CrawlOptions {
        include_paths: body.include_paths.clone(),
        exclude_paths: body.exclude_paths.clone(),
        limit: body.limit.unwrap_or(defaults.limit),
        max_depth: body.max_depth.unwrap_or(defaults.max_depth),
        max_discovery_depth: body.max_discovery_depth.unwrap_or(defaults.max_discovery_depth),
        allow_backward_links: body.allow_backward_links,
        allow_external_links: body.allow_external_links,
        allow_subdomains: body.allow_subdomains,
        ignore_robots_txt: body.ignore_robots_txt,
        ignore_sitemap: body.ignore_sitemap,
        deduplicate_similar_urls: body.deduplicate_similar_urls,
        ignore_query_parameters: body.ignore_query_parameters,
        regex_on_full_url: body.regex_on_full_url,
        delay_ms: body.delay_ms.unwrap_or(defaults.delay_ms),
    })
}

/// "zero-data-retention only if team flags allow" (spec.md §4.10).
pub fn validate_zero_data_retention(requested: bool, flags: &HashMap<String, bool>) -> ApiResult<()> {
    if requested && !flags.get("zero_data_retention").copied().unwrap_or(false) {
        return Err(ApiError::validation(
            "zero data retention was requested but is not enabled for this team",
        ));
    }
    Ok(())
}

pub fn require_flag_allows(auth: &AuthContext, requested_zdr: bool) -> ApiResult<()> {
    validate_zero_data_retention(requested_zdr, &auth.flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ViewportBody;

    #[test]
    fn rejects_url_without_tld() {
        assert!(validate_url("https://localhost").is_err());
    }

    #[test]
    fn accepts_url_with_port_even_without_tld() {
        assert!(validate_url("http://localhost:8080/path").is_ok());
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(validate_url("ftp://example.test/file").is_err());
    }

    #[test]
    fn wait_for_over_half_timeout_is_rejected() {
        let body = ScrapeOptionsBody {
            wait_for: 20_000,
            timeout: 30_000,
            ..Default::default()
        };
        assert!(build_scrape_options(&body).is_err());
    }

    #[test]
    fn wait_for_at_exactly_half_timeout_is_accepted() {
        let body = ScrapeOptionsBody {
            wait_for: 15_000,
            timeout: 30_000,
            ..Default::default()
        };
        assert!(build_scrape_options(&body).is_ok());
    }

    #[test]
    fn oversized_viewport_is_rejected() {
        let body = ScrapeOptionsBody {
            viewport: Some(ViewportBody {
                width: 8000,
                height: 1000,
            }),
            ..Default::default()
        };
        assert!(build_scrape_options(&body).is_err());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let body = ScrapeOptionsBody {
            formats: vec!["pdf_vector".into()],
            ..Default::default()
        };
        assert!(build_scrape_options(&body).is_err());
    }

    #[test]
    fn system_prompt_requires_all_json_formats() {
        let body = ScrapeOptionsBody {
            formats: vec!["markdown".into()],
            system_prompt: Some("summarize".into()),
            ..Default::default()
        };
        assert!(build_scrape_options(&body).is_err());

        let ok_body = ScrapeOptionsBody {
            formats: vec!["json".into()],
            system_prompt: Some("summarize".into()),
            ..Default::default()
        };
        assert!(build_scrape_options(&ok_body).is_ok());
    }

    #[test]
    fn zero_data_retention_requires_team_flag() {
        let mut flags = HashMap::new();
        assert!(validate_zero_data_retention(true, &flags).is_err());
        flags.insert("zero_data_retention".to_string(), true);
        assert!(validate_zero_data_retention(true, &flags).is_ok());
    }

    #[test]
    fn zero_data_retention_not_requested_is_always_fine() {
        let flags = HashMap::new();
        assert!(validate_zero_data_retention(false, &flags).is_ok());
    }
}
