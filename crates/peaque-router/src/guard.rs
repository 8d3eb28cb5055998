//! Cross-origin / CSRF guard.
//!
//! Shared by the dev-server dispatchers and the generated production
//! entry. The policy is browser-first: safe methods pass, fetch metadata
//! is trusted when present, and otherwise the `Origin` host must equal
//! the `Host` header byte-for-byte.

use regex::Regex;
use rustc_hash::FxHashSet;

use crate::http::PeaqueRequest;

/// Guard verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny,
}

/// Bypass configuration: exempt paths and trusted origins.
#[derive(Debug, Default, Clone)]
pub struct GuardConfig {
    bypass_patterns: Vec<Regex>,
    trusted_origins: FxHashSet<String>,
}

impl GuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bypass_path(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.bypass_patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn trust_origin(mut self, origin: impl Into<String>) -> Self {
        self.trusted_origins.insert(origin.into());
        self
    }

    fn is_exempt(&self, req: &PeaqueRequest) -> bool {
        if self.bypass_patterns.iter().any(|p| p.is_match(req.path())) {
            return true;
        }
        match req.header("origin") {
            Some(origin) => self.trusted_origins.contains(origin),
            None => false,
        }
    }
}

/// Evaluate the same-origin policy for one request.
pub fn check_same_origin(config: &GuardConfig, req: &PeaqueRequest) -> GuardDecision {
    if req.method().is_safe() {
        return GuardDecision::Allow;
    }
    if self::deny(config, req) {
        GuardDecision::Deny
    } else {
        GuardDecision::Allow
    }
}

fn deny(config: &GuardConfig, req: &PeaqueRequest) -> bool {
    let exempt = config.is_exempt(req);

    if let Some(site) = req.header("sec-fetch-site").filter(|v| !v.is_empty()) {
        if site == "same-origin" || site == "none" {
            return false;
        }
        return !exempt;
    }

    let origin = match req.header("origin").filter(|v| !v.is_empty()) {
        Some(origin) => origin,
        // No Origin header: not a browser, nothing to protect against.
        None => return false,
    };

    if exempt {
        return false;
    }

    let origin_host = match origin_host(origin) {
        Some(host) => host,
        None => return true,
    };
    req.header("host") != Some(origin_host)
}

/// Extract `host[:port]` from an `Origin` value such as
/// `https://app.example.com:8443`.
fn origin_host(origin: &str) -> Option<&str> {
    let rest = origin.split_once("://").map(|(_, r)| r)?;
    let host = rest.split('/').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn post(path: &str) -> PeaqueRequest {
        PeaqueRequest::new(HttpMethod::Post, path)
    }

    #[test]
    fn safe_methods_always_allow() {
        let config = GuardConfig::new();
        for method in [HttpMethod::Get, HttpMethod::Head, HttpMethod::Options] {
            let req = PeaqueRequest::new(method, "/api/x")
                .with_header("sec-fetch-site", "cross-site");
            assert_eq!(check_same_origin(&config, &req), GuardDecision::Allow);
        }
    }

    #[test]
    fn fetch_metadata_same_origin_allows() {
        let config = GuardConfig::new();
        let req = post("/api/x").with_header("sec-fetch-site", "same-origin");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Allow);
        let req = post("/api/x").with_header("sec-fetch-site", "none");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Allow);
    }

    #[test]
    fn fetch_metadata_cross_site_denies() {
        let config = GuardConfig::new();
        let req = post("/api/x").with_header("sec-fetch-site", "cross-site");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Deny);
    }

    #[test]
    fn missing_origin_allows_non_browser_clients() {
        let config = GuardConfig::new();
        let req = post("/api/x");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Allow);
    }

    #[test]
    fn matching_origin_and_host_allows() {
        let config = GuardConfig::new();
        let req = post("/api/x")
            .with_header("origin", "https://app.example.com:8443")
            .with_header("host", "app.example.com:8443");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Allow);
    }

    #[test]
    fn mismatched_origin_host_denies() {
        let config = GuardConfig::new();
        let req = post("/api/x")
            .with_header("origin", "https://evil.example.com")
            .with_header("host", "app.example.com");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Deny);
    }

    #[test]
    fn unparseable_origin_denies() {
        let config = GuardConfig::new();
        let req = post("/api/x")
            .with_header("origin", "not-a-url")
            .with_header("host", "app.example.com");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Deny);
    }

    #[test]
    fn path_bypass_overrides_denial() {
        let config = GuardConfig::new().bypass_path("^/api/webhooks/").unwrap();
        let req = post("/api/webhooks/stripe").with_header("sec-fetch-site", "cross-site");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Allow);
    }

    #[test]
    fn trusted_origin_overrides_denial() {
        let config = GuardConfig::new().trust_origin("https://trusted.partner");
        let req = post("/api/x")
            .with_header("origin", "https://trusted.partner")
            .with_header("host", "app.example.com");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Allow);

        let req = post("/api/x")
            .with_header("origin", "https://trusted.partner")
            .with_header("sec-fetch-site", "cross-site");
        assert_eq!(check_same_origin(&config, &req), GuardDecision::Allow);
    }
}
