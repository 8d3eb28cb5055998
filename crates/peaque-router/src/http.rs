//! The HTTP seam the framework routes through.
//!
//! The actual listener is an external collaborator (axum in the dev
//! server, the generated entry in production); handlers and middleware
//! only ever see this request/response state.

use rustc_hash::FxHashMap;

/// HTTP methods the router dispatches on. A fixed enum rather than a
/// string map so method routing stays a tagged lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl HttpMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "HEAD" => Some(HttpMethod::Head),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Safe methods per the cross-origin policy.
    pub fn is_safe(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }
}

/// One `Set-Cookie` directive queued on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Rendered attribute tail, e.g. `Path=/; HttpOnly`.
    pub attributes: String,
}

/// Mutable response state middleware and handlers write into.
#[derive(Debug, Clone)]
pub struct ResponseState {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub cookies: Vec<Cookie>,
    /// Once flushed, further mutation is a logic error; the adapter sets
    /// this after handing the response to the transport.
    pub flushed: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        ResponseState {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
            cookies: Vec::new(),
            flushed: false,
        }
    }
}

/// A request as seen by guards, middleware, RPC dispatch and handlers.
#[derive(Debug, Clone)]
pub struct PeaqueRequest {
    method: HttpMethod,
    path: String,
    query: FxHashMap<String, String>,
    path_params: FxHashMap<String, String>,
    /// Header names are stored lowercase.
    headers: FxHashMap<String, String>,
    body: Vec<u8>,
    pub response: ResponseState,
}

impl PeaqueRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        PeaqueRequest {
            method,
            path: path.into(),
            query: FxHashMap::default(),
            path_params: FxHashMap::default(),
            headers: FxHashMap::default(),
            body: Vec::new(),
            response: ResponseState::default(),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn with_query(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn query(&self) -> &FxHashMap<String, String> {
        &self.query
    }

    /// All headers, names lowercase.
    pub fn headers(&self) -> &FxHashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Set by the router after a successful match.
    pub fn set_path_params(&mut self, params: FxHashMap<String, String>) {
        self.path_params = params;
    }

    pub fn path_params(&self) -> &FxHashMap<String, String> {
        &self.path_params
    }

    // Response builders.

    pub fn set_status(&mut self, status: u16) {
        self.response.status = status;
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.response.headers.push((name.to_string(), value.into()));
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.response.body = body.into();
    }

    pub fn set_cookie(&mut self, name: &str, value: &str, attributes: &str) {
        self.response.cookies.push(Cookie {
            name: name.to_string(),
            value: value.to_string(),
            attributes: attributes.to_string(),
        });
    }

    pub fn remove_cookie(&mut self, name: &str) {
        self.response.cookies.push(Cookie {
            name: name.to_string(),
            value: String::new(),
            attributes: "Max-Age=0".to_string(),
        });
    }

    /// Shortcut used by not-found and guard paths.
    pub fn respond_text(&mut self, status: u16, body: &str) {
        self.set_status(status);
        self.set_header("content-type", "text/plain; charset=utf-8");
        self.set_body(body.as_bytes().to_vec());
    }

    pub fn respond_json(&mut self, status: u16, body: &str) {
        self.set_status(status);
        self.set_header("content-type", "application/json");
        self.set_body(body.as_bytes().to_vec());
    }
}

/// Parse a raw query string into pairs. Values stay percent-encoded;
/// decoding is the application's concern.
pub fn parse_query(raw: &str) -> FxHashMap<String, String> {
    let mut out = FxHashMap::default();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((k, v)) => out.insert(k.to_string(), v.to_string()),
            None => out.insert(pair.to_string(), String::new()),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(HttpMethod::parse("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("POST"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("BREW"), None);
    }

    #[test]
    fn safe_methods() {
        assert!(HttpMethod::Get.is_safe());
        assert!(HttpMethod::Head.is_safe());
        assert!(HttpMethod::Options.is_safe());
        assert!(!HttpMethod::Post.is_safe());
        assert!(!HttpMethod::Delete.is_safe());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = PeaqueRequest::new(HttpMethod::Get, "/").with_header("X-Custom", "1");
        assert_eq!(req.header("x-custom"), Some("1"));
        assert_eq!(req.header("X-CUSTOM"), Some("1"));
    }

    #[test]
    fn parse_query_splits_pairs() {
        let q = parse_query("a=1&b=two&flag");
        assert_eq!(q["a"], "1");
        assert_eq!(q["b"], "two");
        assert_eq!(q["flag"], "");
    }

    #[test]
    fn response_builders_accumulate() {
        let mut req = PeaqueRequest::new(HttpMethod::Post, "/api/x");
        req.set_status(201);
        req.set_header("x-trace", "abc");
        req.set_cookie("session", "s1", "Path=/; HttpOnly");
        req.set_body(b"done".to_vec());

        assert_eq!(req.response.status, 201);
        assert_eq!(req.response.headers, vec![("x-trace".to_string(), "abc".to_string())]);
        assert_eq!(req.response.cookies[0].name, "session");
        assert_eq!(req.response.body, b"done");
    }
}
