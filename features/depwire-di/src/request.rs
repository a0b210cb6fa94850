use std::{collections::HashMap, sync::OnceLock};

use biscotti::{Processor, ProcessorConfig, RequestCookies};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};

/// The already routed request, as seen by extractors
///
/// Routing is done elsewhere - path parameters are handed in as matched.
#[derive(Debug)]
pub struct RequestParts {
    method: Method,
    path: String,
    path_params: HashMap<String, String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Vec<u8>,
    json: OnceLock<Result<serde_json::Value, String>>,
}

impl RequestParts {
    /// Builds the parts from a buffered http request and the params matched by the router
    pub fn from_http(
        request: http::Request<Vec<u8>>,
        path_params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let (parts, body) = request.into_parts();
        let query = parts
            .uri
            .query()
            .map(parse_query)
            .unwrap_or_default();

        RequestParts {
            method: parts.method,
            path: parts.uri.path().to_string(),
            path_params: path_params.into_iter().collect(),
            query,
            headers: parts.headers,
            body,
            json: OnceLock::new(),
        }
    }

    pub fn builder() -> RequestPartsBuilder {
        RequestPartsBuilder::default()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All values of a repeated query parameter, in order
    pub fn query_params<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + 'n
    where
        'a: 'n,
    {
        self.query
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Header lookups are case insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
        self.headers.get(name)?.to_str().ok()
    }

    /// Value of the first cookie called `name` across all `Cookie` headers
    ///
    /// Values are percent decoded and lose their surrounding double quotes.
    /// Malformed headers are skipped.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let processor: Processor = ProcessorConfig::default().into();
        let mut cookies = RequestCookies::new();
        for value in self.headers.get_all(header::COOKIE) {
            let Ok(value) = value.to_str() else {
                tracing::warn!("Skipping a non ascii cookie header");
                continue;
            };
            if let Err(e) = cookies.extend_from_header(value, &processor) {
                tracing::warn!("Skipping a malformed cookie header: {e}");
            }
        }

        let cookie = cookies.get(name)?;
        let value = cookie.value();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(value.to_string())
    }

    /// The body parsed as json, parsed once on first access
    ///
    /// `Ok(None)` if the request has no body
    pub fn json(&self) -> Result<Option<&serde_json::Value>, &str> {
        if self.body.is_empty() {
            return Ok(None);
        }

        let parsed = self.json.get_or_init(|| {
            serde_json::from_slice(&self.body).map_err(|e| e.to_string())
        });

        match parsed {
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(e.as_str()),
        }
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Assembles [RequestParts] by hand
#[derive(Default)]
pub struct RequestPartsBuilder {
    method: Method,
    path: String,
    path_params: HashMap<String, String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RequestPartsBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Ignores headers which are not valid http header names or values
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!("Ignoring invalid header '{name}'"),
        }
        self
    }

    /// Appends a `Cookie` header carrying one pair
    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.header(header::COOKIE.as_str(), &format!("{name}={value}"))
    }

    pub fn json(mut self, body: &serde_json::Value) -> Self {
        self.body = body.to_string().into_bytes();
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    pub fn raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> RequestParts {
        RequestParts {
            method: self.method,
            path: self.path,
            path_params: self.path_params,
            query: self.query,
            headers: self.headers,
            body: self.body,
            json: OnceLock::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_http_parses_query_and_cookies() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/items/?q=foo%20bar&tag=a&tag=b")
            .header("Cookie", "last_query=stored; theme=dark")
            .body(b"{\"title\":\"Foo\"}".to_vec())
            .unwrap();

        let parts = RequestParts::from_http(request, [("item_id".to_string(), "7".to_string())]);

        assert_eq!(parts.method(), Method::POST);
        assert_eq!(parts.path(), "/items/");
        assert_eq!(parts.query_param("q"), Some("foo bar"));
        assert_eq!(parts.query_params("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(parts.cookie("last_query").as_deref(), Some("stored"));
        assert_eq!(parts.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(parts.path_param("item_id"), Some("7"));
        assert_eq!(
            parts.json().unwrap(),
            Some(&serde_json::json!({"title": "Foo"}))
        );
    }

    #[test]
    fn header_lookup_ignores_case() {
        let parts = RequestParts::builder().header("X-Token", "secret").build();
        assert_eq!(parts.header("x-token"), Some("secret"));
        assert_eq!(parts.header("X-TOKEN"), Some("secret"));
        assert_eq!(parts.header("x-key"), None);
    }

    #[test]
    fn invalid_json_body_is_reported() {
        let parts = RequestParts::builder().raw_body("{not json").build();
        assert!(parts.json().is_err());

        let empty = RequestParts::builder().build();
        assert_eq!(empty.json(), Ok(None));
    }

    #[test]
    fn repeated_query_values_outlive_the_name() {
        let parts = RequestParts::builder()
            .query("tag", "a")
            .query("other", "x")
            .query("tag", "b")
            .build();

        let values: Vec<&str> = {
            let name = String::from("tag");
            parts.query_params(&name).collect()
        };
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn cookie_values_are_unquoted_and_decoded() {
        let request = http::Request::builder()
            .uri("/query/")
            .header("Cookie", "last_query=\"stored value\"; other=a%20b")
            .header("Cookie", "theme=dark")
            .body(Vec::new())
            .unwrap();
        let parts = RequestParts::from_http(request, []);

        assert_eq!(parts.cookie("last_query").as_deref(), Some("stored value"));
        assert_eq!(parts.cookie("other").as_deref(), Some("a b"));
        assert_eq!(parts.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(parts.cookie("missing"), None);
    }

    #[test]
    fn builder_cookies_go_through_the_cookie_header() {
        let parts = RequestParts::builder()
            .cookie("last_query", "stored")
            .cookie("theme", "dark")
            .build();

        assert_eq!(parts.headers().get_all(header::COOKIE).iter().count(), 2);
        assert_eq!(parts.cookie("last_query").as_deref(), Some("stored"));
        assert_eq!(parts.cookie("theme").as_deref(), Some("dark"));
    }
}
