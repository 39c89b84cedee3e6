//! Rendered responses.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Body of the fixed not-found page.
pub const NOT_FOUND_PAGE: &str = "<title>404 not found</title>\n<h1>Not found</h1>\n<p> The requested URL was not found on this server . </p>\n";

/// Body sent when a handler fails.
pub const SERVER_ERROR_PAGE: &str = "<title>500 internal server error</title>\n<h1>Internal Server Error</h1>\n";

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Status, headers and body produced by the application shell.
#[derive(Debug, Clone)]
pub struct SiteResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl SiteResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND_PAGE)
    }

    pub fn server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_PAGE)
    }

    /// Add `Content-Type` and `X-Powered-By` unless already set.
    pub fn with_site_headers(mut self, powered_by: &str) -> Self {
        self.headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(HTML_CONTENT_TYPE));
        if !powered_by.is_empty() {
            if let Ok(value) = HeaderValue::from_str(powered_by) {
                self.headers.entry("x-powered-by").or_insert(value);
            }
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl IntoResponse for SiteResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_headers_do_not_override() {
        let mut response = SiteResponse::new(StatusCode::OK, "{}");
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let response = response.with_site_headers("sitekit");

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("x-powered-by"), Some("sitekit"));
    }

    #[test]
    fn test_into_response() {
        let response = SiteResponse::not_found()
            .with_site_headers("")
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["content-type"], HTML_CONTENT_TYPE);
        assert!(response.headers().get("x-powered-by").is_none());
    }
}
