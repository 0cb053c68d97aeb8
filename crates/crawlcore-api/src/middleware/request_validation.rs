//! Request validation middleware: HTTP method allowlist and
//! Content-Type checks applied before any handler runs.
//!
//! Adapted from `riptide-api/src/middleware/request_validation.rs`,
//! narrowed to this system's own path set.

use std::collections::HashSet;

use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub async fn request_validation_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();

    if let Err(response) = validate_http_method(&method, &path) {
        return response;
    }

    if matches!(method, Method::POST | Method::DELETE) {
        if let Err(response) = validate_content_type(&method, &headers) {
            return response;
        }
    }

    next.run(request).await
}

pub(crate) fn get_allowed_methods(path: &str) -> HashSet<&'static str> {
    if path.starts_with("/healthz") || path.starts_with("/health") {
        return ["GET", "HEAD"].into_iter().collect();
    }
    if path == "/crawl/ongoing" {
        return ["GET"].into_iter().collect();
    }
    if path.starts_with("/crawl/") {
        return ["GET", "DELETE"].into_iter().collect();
    }
    if path == "/crawl" || path == "/scrape" || path == "/batch/scrape" || path == "/search" {
        return ["POST"].into_iter().collect();
    }
    ["GET", "POST", "DELETE"].into_iter().collect()
}

pub(crate) fn validate_http_method(method: &Method, path: &str) -> Result<(), Response> {
    let allowed = get_allowed_methods(path);
    if !allowed.contains(method.as_str()) {
        tracing::warn!(%method, path, ?allowed, "method not allowed");
        return Err(method_not_allowed_response(&allowed));
    }
    Ok(())
}

fn validate_content_type(method: &Method, headers: &axum::http::HeaderMap) -> Result<(), Response> {
    // DELETE carries no body on this system's endpoints.
    if *method == Method::DELETE {
        return Ok(());
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("application/json") {
        tracing::warn!(content_type, "unsupported content-type");
        return Err(unsupported_media_type_response(content_type));
    }
    Ok(())
}

fn method_not_allowed_response(allowed: &HashSet<&'static str>) -> Response {
    let mut list: Vec<&str> = allowed.iter().copied().collect();
    list.sort_unstable();
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": { "type": "method_not_allowed", "allowed": list },
        })),
    )
        .into_response()
}

fn unsupported_media_type_response(content_type: &str) -> Response {
    (
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Json(json!({
            "error": {
                "type": "unsupported_media_type",
                "message": format!("expected application/json, got '{content_type}'"),
            }
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_post_endpoint_rejects_get() {
        let allowed = get_allowed_methods("/crawl");
        assert!(!allowed.contains("GET"));
        assert!(allowed.contains("POST"));
    }

    #[test]
    fn crawl_id_allows_get_and_delete() {
        let allowed = get_allowed_methods("/crawl/abc-123");
        assert!(allowed.contains("GET"));
        assert!(allowed.contains("DELETE"));
        assert!(!allowed.contains("POST"));
    }

    #[test]
    fn health_is_get_only() {
        let allowed = get_allowed_methods("/healthz");
        assert_eq!(allowed, ["GET", "HEAD"].into_iter().collect());
    }
}
