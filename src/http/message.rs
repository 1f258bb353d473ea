//! Request vocabulary
//!
//! Methods, redirect policy and the parsed request target.

use super::{DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use std::fmt;

/// HTTP request methods supported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    /// Wire representation of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    /// Whether a request with this method normally carries a body.
    ///
    /// Controls whether `Content-Length: 0` is still emitted when the
    /// caller supplied no payload.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Redirect-following policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowRedirects {
    /// Never follow a redirect; return the 3xx status to the caller.
    #[default]
    Disabled,
    /// Follow redirects per RFC 7231: 301/307 re-issue the same method
    /// only for GET/HEAD, 302/303 downgrade to GET and drop the body.
    Strict,
    /// As `Strict`, but 301/307 also preserve non-GET/HEAD methods and
    /// their payload.
    Force,
}

/// Parsed request target: scheme, host, port and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Target {
    /// Parse an absolute URL of the form `scheme://host[:port][/path]`.
    ///
    /// Only `http` and `https` schemes are accepted. The query string
    /// stays attached to the path; userinfo and fragments are not
    /// supported.
    pub fn parse(url: &str) -> Option<Target> {
        let (scheme, rest) = url.split_once("://")?;
        let scheme = scheme.to_ascii_lowercase();

        let default_port = match scheme.as_str() {
            "http" => DEFAULT_HTTP_PORT,
            "https" => DEFAULT_HTTPS_PORT,
            _ => return None,
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return None;
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (h, p.parse::<u16>().ok()?),
            None => (authority, default_port),
        };
        if host.is_empty() {
            return None;
        }

        Some(Target {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Resolve a redirect `Location` value against this target.
    ///
    /// Absolute URLs are parsed as usual; a value starting with `/`
    /// keeps the current scheme, host and port. Other relative forms
    /// are rejected.
    pub fn resolve(&self, location: &str) -> Option<Target> {
        if location.starts_with('/') {
            let mut target = self.clone();
            target.path = location.to_string();
            return Some(target);
        }
        Target::parse(location)
    }

    /// Whether this target is reachable over the same transport
    /// connection as `other`.
    pub fn same_connection(&self, other: &Target) -> bool {
        self.scheme == other.scheme && self.host == other.host && self.port == other.port
    }

    /// Whether the target uses TLS
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// `host` or `host:port` as it belongs in the Host header
    pub fn host_header(&self) -> String {
        let default_port = if self.is_secure() {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host_header(), self.path)
    }
}
