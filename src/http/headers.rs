//! HTTP header stores
//!
//! Two ordered name/value collections with case-insensitive lookups:
//! the request side (caller-supplied headers, reserved names rejected)
//! and the response side (captured headers, optional collect
//! allow-list, dedicated redirect Location slot).

use super::MAX_HEADERS;
use std::fmt;

/// Header names managed by the engine itself.
///
/// `addHeader` attempts to set these are silently ignored; credentials
/// go through the dedicated authorization configuration instead.
const RESERVED_NAMES: [&str; 5] = [
    "Connection",
    "User-Agent",
    "Accept-Encoding",
    "Host",
    "Authorization",
];

/// Ordered request header list.
///
/// Insertion order is the wire order. Name comparison is
/// case-insensitive for replacement and removal.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
    headers: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        RequestHeaders::default()
    }

    /// Whether the engine manages this header name internally.
    pub fn is_reserved(name: &str) -> bool {
        RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
    }

    /// Add a header.
    ///
    /// Reserved names are silently ignored. With `replace`, the first
    /// case-insensitive match is overwritten in place; otherwise the
    /// entry is appended, or prepended when `first` is set.
    pub fn add(&mut self, name: &str, value: &str, first: bool, replace: bool) {
        if Self::is_reserved(name) {
            return;
        }

        if replace {
            for (n, v) in &mut self.headers {
                if n.eq_ignore_ascii_case(name) {
                    *v = value.to_string();
                    return;
                }
            }
        }

        if first {
            self.headers.insert(0, (name.to_string(), value.to_string()));
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    /// Remove all entries matching `name` (case-insensitive).
    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Drop the headers that describe a specific request body
    /// (`Content-Length`, `Content-Type`, `Accept`), keeping the
    /// persistent ones. Used between redirect hops.
    pub fn clear_request_specific(&mut self) {
        self.headers.retain(|(n, _)| {
            !n.eq_ignore_ascii_case("Content-Length")
                && !n.eq_ignore_ascii_case("Content-Type")
                && !n.eq_ignore_ascii_case("Accept")
        });
    }

    /// Iterate in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl fmt::Display for RequestHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

/// Captured response headers for the current exchange.
///
/// With a non-empty collect list only matching names are stored; the
/// `Location` header is additionally captured into its own slot no
/// matter what the list says.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    headers: Vec<(String, String)>,
    collect: Vec<String>,
    location: Option<String>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        ResponseHeaders::default()
    }

    /// Configure the collect allow-list.
    ///
    /// An empty list captures everything. Resetting the list also
    /// clears headers captured so far.
    pub fn set_collect(&mut self, names: &[&str]) {
        self.collect = names.iter().map(|n| n.to_string()).collect();
        self.headers.clear();
    }

    /// Store one received header, applying the allow-list.
    pub fn capture(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("Location") {
            self.location = Some(value.to_string());
        }

        let wanted = self.collect.is_empty()
            || self.collect.iter().any(|c| c.eq_ignore_ascii_case(name));
        if wanted && self.headers.len() < MAX_HEADERS {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Header value by capture index
    pub fn value_at(&self, index: usize) -> Option<&str> {
        self.headers.get(index).map(|(_, v)| v.as_str())
    }

    /// Header name by capture index
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.headers.get(index).map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Whether a header was captured with a non-empty value
    pub fn has(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(n, v)| n.eq_ignore_ascii_case(name) && !v.is_empty())
    }

    /// Redirect target from the last response, if any
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Drop captured headers and the Location slot, keeping the
    /// collect list. Called at the start of every exchange.
    pub fn clear_captured(&mut self) {
        self.headers.clear();
        self.location = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_case_insensitive() {
        let mut headers = RequestHeaders::new();
        headers.add("Content-Type", "text/plain", false, true);

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.get("Missing"), None);
    }

    #[test]
    fn test_replace_in_place_keeps_position() {
        let mut headers = RequestHeaders::new();
        headers.add("X-First", "1", false, true);
        headers.add("X-Second", "2", false, true);
        headers.add("x-first", "one", false, true);

        let order: Vec<_> = headers.iter().collect();
        assert_eq!(order, vec![("X-First", "one"), ("X-Second", "2")]);
    }

    #[test]
    fn test_append_and_prepend_without_replace() {
        let mut headers = RequestHeaders::new();
        headers.add("X-A", "1", false, false);
        headers.add("X-A", "2", false, false);
        headers.add("X-Z", "z", true, false);

        let order: Vec<_> = headers.iter().collect();
        assert_eq!(order, vec![("X-Z", "z"), ("X-A", "1"), ("X-A", "2")]);
        // get returns the first match
        assert_eq!(headers.get("x-a"), Some("1"));
    }

    #[test]
    fn test_remove_all_matches() {
        let mut headers = RequestHeaders::new();
        headers.add("X-Remove", "1", false, false);
        headers.add("X-Keep", "2", false, false);
        headers.add("x-remove", "3", false, false);

        headers.remove("X-REMOVE");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Keep"), Some("2"));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let mut headers = RequestHeaders::new();
        for name in ["Connection", "user-agent", "ACCEPT-ENCODING", "Host", "authorization"] {
            headers.add(name, "x", false, true);
        }
        assert!(headers.is_empty());
    }

    #[test]
    fn test_interleaved_sequence_matches_semantics() {
        let mut headers = RequestHeaders::new();
        headers.add("Accept", "text/html", false, true);
        headers.add("X-Token", "a", false, true);
        headers.add("ACCEPT", "application/json", false, true); // replace
        headers.remove("x-token");
        headers.add("X-Token", "b", true, false); // prepend

        let order: Vec<_> = headers.iter().collect();
        assert_eq!(
            order,
            vec![("X-Token", "b"), ("Accept", "application/json")]
        );
    }

    #[test]
    fn test_clear_request_specific() {
        let mut headers = RequestHeaders::new();
        headers.add("Content-Type", "application/json", false, true);
        headers.add("Content-Length", "12", false, true);
        headers.add("Accept", "*/*", false, true);
        headers.add("X-Api-Key", "secret", false, true);

        headers.clear_request_specific();
        let order: Vec<_> = headers.iter().collect();
        assert_eq!(order, vec![("X-Api-Key", "secret")]);
    }

    #[test]
    fn test_capture_all_when_no_collect_list() {
        let mut resp = ResponseHeaders::new();
        resp.capture("Content-Type", "text/plain");
        resp.capture("Server", "demo");

        assert_eq!(resp.len(), 2);
        assert_eq!(resp.name_at(0), Some("Content-Type"));
        assert_eq!(resp.value_at(1), Some("demo"));
        assert_eq!(resp.name_at(2), None);
    }

    #[test]
    fn test_collect_list_filters() {
        let mut resp = ResponseHeaders::new();
        resp.set_collect(&["x-request-id"]);
        resp.capture("Content-Type", "text/plain");
        resp.capture("X-Request-Id", "abc123");

        assert_eq!(resp.len(), 1);
        assert_eq!(resp.get("X-Request-ID"), Some("abc123"));
        assert!(!resp.has("Content-Type"));
    }

    #[test]
    fn test_set_collect_clears_previous_capture() {
        let mut resp = ResponseHeaders::new();
        resp.capture("Server", "demo");
        assert_eq!(resp.len(), 1);

        resp.set_collect(&["Server"]);
        assert!(resp.is_empty());
    }

    #[test]
    fn test_location_captured_despite_filter() {
        let mut resp = ResponseHeaders::new();
        resp.set_collect(&["Content-Type"]);
        resp.capture("location", "http://example.com/next");

        assert!(resp.is_empty());
        assert_eq!(resp.location(), Some("http://example.com/next"));

        resp.clear_captured();
        assert_eq!(resp.location(), None);
    }

    #[test]
    fn test_has_requires_non_empty_value() {
        let mut resp = ResponseHeaders::new();
        resp.capture("X-Empty", "");
        resp.capture("X-Full", "v");

        assert!(!resp.has("X-Empty"));
        assert!(resp.has("x-full"));
    }
}
