//! Reusable request templates.
//!
//! [`RequestPool`] hands out [`PooledRequest`] values bound to one method and
//! target URL. Templates are built lazily, recycled indefinitely, and never
//! reset by the pool: whoever checks one out overwrites its per-use state.

use std::collections::BTreeMap;
use std::mem;

use delegate::delegate;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::PoolError;
use crate::url_encoding::{encode_query, parse_query};

/// Request bound to a fixed method and URL, with mutable per-use state.
#[derive(Clone, Debug)]
pub struct PooledRequest {
    method: &'static str,
    base: String,
    template_query: BTreeMap<String, Vec<String>>,
    query: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl PooledRequest {
    /// Build a template for `method` and `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidTemplate`] unless `url` is an absolute
    /// `http` or `https` URL with a host.
    pub fn new(method: &'static str, url: &str) -> Result<Self, PoolError> {
        let invalid = |reason: &str| PoolError::InvalidTemplate {
            url: url.to_owned(),
            reason: reason.to_owned(),
        };
        if url.chars().any(char::is_whitespace) {
            return Err(invalid("url contains whitespace"));
        }
        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(invalid("unsupported scheme"));
        }
        let rest = rest.split('#').next().unwrap_or_default();
        let (location, raw_query) = rest.split_once('?').unwrap_or((rest, ""));
        let authority = location.split('/').next().unwrap_or_default();
        if authority.is_empty() || authority.starts_with(':') {
            return Err(invalid("missing host"));
        }
        Ok(Self {
            method,
            base: format!("{}://{location}", scheme.to_ascii_lowercase()),
            template_query: parse_query(raw_query),
            query: BTreeMap::new(),
            headers: Vec::new(),
            body: Vec::new(),
        })
    }

    fn placeholder() -> Self {
        Self {
            method: "",
            base: String::new(),
            template_query: BTreeMap::new(),
            query: BTreeMap::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Clear body, headers, and per-use query parameters.
    ///
    /// Query parameters that are part of the template URL are kept.
    pub fn reset(&mut self) {
        self.query.clear();
        self.headers.clear();
        self.body.clear();
    }

    /// Replace the body, reusing the existing buffer.
    pub fn set_body(&mut self, body: &[u8]) {
        self.body.clear();
        self.body.extend_from_slice(body);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Set a header, replacing any value under the same case-insensitive name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set a query parameter, replacing every existing value for `key`.
    pub fn set_query_param(&mut self, key: &str, value: &str) {
        self.query.insert(key.to_owned(), value.to_owned());
    }

    /// Full target URL including the encoded query string.
    pub fn url(&self) -> String {
        let mut pairs = self.template_query.clone();
        for (key, value) in &self.query {
            pairs.insert(key.clone(), vec![value.clone()]);
        }
        if pairs.is_empty() {
            return self.base.clone();
        }
        format!("{}?{}", self.base, encode_query(&pairs))
    }
}

/// Unbounded pool of [`PooledRequest`] templates.
#[derive(Debug)]
pub struct RequestPool {
    method: &'static str,
    url: String,
    idle: Mutex<Vec<PooledRequest>>,
    failure: OnceCell<PoolError>,
}

impl RequestPool {
    pub fn new(method: &'static str, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            idle: Mutex::new(Vec::new()),
            failure: OnceCell::new(),
        }
    }

    /// Target URL the templates are bound to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Take an idle template or build a new one.
    ///
    /// # Errors
    ///
    /// Returns the template construction error. Once construction has failed
    /// the same error is returned on every later call.
    pub fn checkout(&self) -> Result<PooledRequest, PoolError> {
        if let Some(err) = self.failure.get() {
            return Err(err.clone());
        }
        if let Some(req) = self.idle.lock().pop() {
            return Ok(req);
        }
        PooledRequest::new(self.method, &self.url)
            .map_err(|err| self.failure.get_or_init(|| err).clone())
    }

    /// Return a template for reuse. Its state is left untouched.
    pub fn release(&self, req: PooledRequest) {
        self.idle.lock().push(req);
    }

    /// Check out a template that is released when the guard drops.
    pub fn checkout_guard(&self) -> Result<Checkout<'_>, PoolError> {
        let req = self.checkout()?;
        Ok(Checkout { pool: self, req })
    }

    /// Number of templates currently idle.
    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Checked-out template, returned to its pool on drop.
pub struct Checkout<'a> {
    pool: &'a RequestPool,
    req: PooledRequest,
}

impl Checkout<'_> {
    delegate! {
        to self.req {
            pub fn reset(&mut self);
            pub fn set_body(&mut self, body: &[u8]);
            pub fn set_header(&mut self, name: &str, value: &str);
            pub fn set_query_param(&mut self, key: &str, value: &str);
            pub fn url(&self) -> String;
        }
    }

    pub fn request(&self) -> &PooledRequest {
        &self.req
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        let req = mem::replace(&mut self.req, PooledRequest::placeholder());
        self.pool.release(req);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const URL: &str = "https://oapi.dingtalk.com/robot/send";

    #[rstest]
    #[case("oapi.dingtalk.com/robot/send")]
    #[case("ftp://oapi.dingtalk.com/")]
    #[case("https:///robot/send")]
    #[case("https://oapi.ding talk.com/")]
    fn rejects_malformed_urls(#[case] url: &str) {
        assert!(PooledRequest::new("POST", url).is_err());
    }

    #[rstest]
    fn keeps_template_query_and_overrides_per_use_keys() {
        let mut req =
            PooledRequest::new("POST", "https://robot.example/send?access_token=old&v=1")
                .expect("template");
        req.set_query_param("access_token", "new token");
        assert_eq!(req.url(), "https://robot.example/send?access_token=new+token&v=1");
    }

    #[rstest]
    fn released_templates_are_reused() {
        let pool = RequestPool::new("POST", URL);
        let req = pool.checkout().expect("checkout");
        pool.release(req);
        assert_eq!(pool.idle_len(), 1);
        let _again = pool.checkout().expect("checkout");
        assert_eq!(pool.idle_len(), 0);
    }

    #[rstest]
    fn checkouts_beyond_idle_allocate() {
        let pool = RequestPool::new("POST", URL);
        let a = pool.checkout().expect("first");
        let b = pool.checkout().expect("second");
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle_len(), 2);
    }

    #[rstest]
    fn construction_failure_is_sticky() {
        let pool = RequestPool::new("POST", "not a url");
        let first = pool.checkout().expect_err("invalid");
        let second = pool.checkout().expect_err("invalid");
        assert_eq!(first, second);
    }

    #[rstest]
    fn guard_releases_on_drop() {
        let pool = RequestPool::new("POST", URL);
        {
            let mut guard = pool.checkout_guard().expect("checkout");
            guard.set_body(b"payload");
        }
        assert_eq!(pool.idle_len(), 1);
        let req = pool.checkout().expect("reuse");
        assert_eq!(req.body(), b"payload");
    }

    #[rstest]
    fn guard_forwards_to_the_template() {
        let pool = RequestPool::new("POST", URL);
        let mut guard = pool.checkout_guard().expect("checkout");
        guard.reset();
        guard.set_header("User-Agent", "beat 1.0");
        guard.set_query_param("access_token", "t");
        assert_eq!(guard.url(), format!("{URL}?access_token=t"));
        assert_eq!(guard.request().header("user-agent"), Some("beat 1.0"));
    }

    #[rstest]
    fn reset_clears_per_use_state() {
        let mut req = PooledRequest::new("POST", URL).expect("template");
        req.set_body(b"a long first body");
        req.set_header("X-Trace", "1");
        req.set_query_param("access_token", "t1");
        req.reset();
        req.set_body(b"b");
        assert_eq!(req.body(), b"b");
        assert_eq!(req.header("x-trace"), None);
        assert_eq!(req.url(), URL);
    }

    #[rstest]
    fn set_header_replaces_case_insensitively() {
        let mut req = PooledRequest::new("POST", URL).expect("template");
        req.set_header("content-type", "text/plain");
        req.set_header("Content-Type", "application/json");
        assert_eq!(req.headers().count(), 1);
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    }
}
