//! Immutable request values handed to handlers.
//!
//! # Responsibilities
//! - Derive the routing path (URL path or `?/path` query mode, minus the
//!   mount path)
//! - Merge query, form and JSON body inputs behind [`Request::input`]
//! - Carry the request id assigned by the server layer
//!
//! # Design Decisions
//! - Inputs are parsed once when the request is built
//! - Body inputs override query inputs with the same name

use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Where the routing path is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    /// `/mount/user/42` routes `/user/42`.
    #[default]
    Path,
    /// `/mount/?/user/42?x=1` routes `/user/42` with query `x=1`.
    Query,
}

/// How requests are turned into routing paths.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub path_source: PathSource,
    /// Prefix stripped from the URL path before routing.
    pub mount_path: String,
}

/// A request as seen by handlers.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    body: Map<String, Json>,
    headers: HeaderMap,
}

impl Request {
    /// A request with no inputs or headers.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.replace('\0', ""),
            query: Vec::new(),
            body: Map::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Build from the parts of an HTTP request and its collected body.
    pub fn from_http(parts: &Parts, body: &[u8], options: &RequestOptions) -> Self {
        let raw_path = parts.uri.path();
        let raw_query = parts.uri.query().unwrap_or_default();

        let (path, query) = match options.path_source {
            PathSource::Path => (
                strip_mount(&decode(raw_path), &options.mount_path),
                raw_query.to_string(),
            ),
            PathSource::Query if raw_query.starts_with('/') => match raw_query.split_once('?') {
                Some((path, query)) => (decode(path).into_owned(), query.to_string()),
                None => (decode(raw_query).into_owned(), String::new()),
            },
            PathSource::Query => ("/".to_string(), raw_query.to_string()),
        };

        Self::new(parts.method.as_str(), &path)
            .with_query(&query)
            .with_body(body)
            .with_headers(parts.headers.clone())
    }

    /// Parse `query` as `application/x-www-form-urlencoded` inputs.
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.replace('\0', ""), v.replace('\0', "")))
            .collect();
        self
    }

    /// Parse a body as JSON when it is an object or array, as form data
    /// otherwise.
    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = parse_body(body);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Uppercase method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    /// The routing path, before normalization.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    /// A query-string value. The last occurrence wins.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// One input from the body or, failing that, the query string.
    pub fn input(&self, name: &str) -> Option<Json> {
        self.body
            .get(name)
            .cloned()
            .or_else(|| self.query(name).map(|v| Json::String(v.to_string())))
    }

    /// Every input, with body values overriding query values.
    pub fn inputs(&self) -> Map<String, Json> {
        let mut all: Map<String, Json> = self
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Json::String(v.clone())))
            .collect();
        all.extend(self.body.clone());
        all
    }
}

fn decode(raw: &str) -> std::borrow::Cow<'_, str> {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded,
        Err(_) => std::borrow::Cow::Borrowed(raw),
    }
}

fn strip_mount(path: &str, mount: &str) -> String {
    let mount = mount.trim_end_matches('/');
    if mount.is_empty() {
        return path.to_string();
    }
    match path.strip_prefix(mount) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

fn parse_body(body: &[u8]) -> Map<String, Json> {
    let cleaned: Vec<u8> = body.iter().copied().filter(|b| *b != 0).collect();
    if cleaned.is_empty() {
        return Map::new();
    }
    match serde_json::from_slice::<Json>(&cleaned) {
        Ok(Json::Object(map)) => map,
        Ok(Json::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => url::form_urlencoded::parse(&cleaned)
            .map(|(k, v)| (k.into_owned(), Json::String(v.into_owned())))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use serde_json::json;

    fn parts(uri: &str) -> Parts {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header(X_REQUEST_ID, "abc")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_path_mode_decodes_and_strips_mount() {
        let options = RequestOptions {
            path_source: PathSource::Path,
            mount_path: "/site/".into(),
        };
        let req = Request::from_http(&parts("/site/hello%20world/?a=1"), b"", &options);
        assert_eq!(req.method(), "POST");
        assert_eq!(req.path(), "/hello world/");
        assert_eq!(req.query("a"), Some("1"));
        assert_eq!(req.request_id(), Some("abc"));

        let req = Request::from_http(&parts("/sitemap.xml"), b"", &options);
        assert_eq!(req.path(), "/sitemap.xml");
    }

    #[test]
    fn test_query_mode() {
        let options = RequestOptions {
            path_source: PathSource::Query,
            mount_path: String::new(),
        };
        let req = Request::from_http(&parts("/index?/user/42?tab=posts"), b"", &options);
        assert_eq!(req.path(), "/user/42");
        assert_eq!(req.query("tab"), Some("posts"));

        let req = Request::from_http(&parts("/index?tab=posts"), b"", &options);
        assert_eq!(req.path(), "/");
        assert_eq!(req.query("tab"), Some("posts"));
    }

    #[test]
    fn test_inputs_merge_body_over_query() {
        let req = Request::new("POST", "/")
            .with_query("name=query&page=2")
            .with_body(b"name=form&x=%2F");
        assert_eq!(req.input("name"), Some(json!("form")));
        assert_eq!(req.input("page"), Some(json!("2")));
        assert_eq!(req.input("x"), Some(json!("/")));
        assert_eq!(req.input("missing"), None);
        assert_eq!(req.inputs().len(), 3);
    }

    #[test]
    fn test_json_body_inputs() {
        let req = Request::new("POST", "/").with_body(br#"{"count": 3, "tags": ["a"]}"#);
        assert_eq!(req.input("count"), Some(json!(3)));
        assert_eq!(req.input("tags"), Some(json!(["a"])));

        let req = Request::new("POST", "/").with_body(b"[1, 2]");
        assert_eq!(req.input("1"), Some(json!(2)));
    }

    #[test]
    fn test_nul_bytes_are_removed() {
        let req = Request::new("get", "/a\0b").with_query("k%00=v%00");
        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/ab");
        assert_eq!(req.query("k"), Some("v"));
    }
}
