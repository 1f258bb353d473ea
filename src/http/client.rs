//! HTTP client
//!
//! The request/connection controller. Owns the configured target and
//! request headers, opens or reuses the transport, drives the
//! send-request / follow-redirect loop and exposes the response
//! through the header store and the body decoder.
//!
//! Send operations return the literal HTTP status code on success and
//! a negative code from the closed error set on failure (see
//! [`error_to_string`]).

use super::body::BodyReader;
use super::headers::{RequestHeaders, ResponseHeaders};
use super::message::{FollowRedirects, Method, Target};
use super::parser::ResponseHeaderParser;
use super::session::{FdSessionOps, HttpSession, Transport};
use super::tls::{TlsOptions, TlsSessionOps};
use super::transfer::{self, BodySource};
use super::{error_to_string, Error, Result, CRLF, DEFAULT_TCP_TIMEOUT_MS, RX_BUFFER_SIZE};
use crate::net::{self, KeepAlive};
use log::{debug, error, trace, warn};
use std::time::Duration;

/// Hooks invoked synchronously at fixed points of an exchange.
///
/// `on_headers` fires after every response header block, once per
/// redirect hop; `on_complete` fires once per caller-initiated send
/// with the final status or error code.
pub trait ExchangeObserver {
    fn on_headers(&mut self, _status: u16, _headers: &ResponseHeaders) {}
    fn on_complete(&mut self, _result: i32) {}
}

/// What the redirect policy asks for after a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RedirectAction {
    None,
    SameMethod,
    DowngradeToGet,
}

fn redirect_action(policy: FollowRedirects, method: Method, status: u16) -> RedirectAction {
    if policy == FollowRedirects::Disabled {
        return RedirectAction::None;
    }
    match status {
        // Redirect using the same method, gated on GET/HEAD unless forced
        301 | 307 => {
            if policy == FollowRedirects::Force || method == Method::Get || method == Method::Head {
                RedirectAction::SameMethod
            } else {
                RedirectAction::None
            }
        }
        // Redirect after dropping to GET/HEAD and discarding the payload
        302 | 303 => RedirectAction::DowngradeToGet,
        _ => RedirectAction::None,
    }
}

/// Blocking HTTP/1.1 client engine.
///
/// One instance drives one connection; it is not meant to be shared
/// across threads. Configure a target with one of the `begin` calls,
/// issue requests, then read the body through the decode cursor.
pub struct HttpClient {
    target: Option<Target>,
    tls: TlsOptions,
    session: Option<HttpSession<Transport>>,

    reuse: bool,
    must_reinit: bool,
    user_agent: String,
    credentials: Option<(String, String)>,
    connect_timeout: Duration,
    keep_alive: KeepAlive,
    follow_redirects: FollowRedirects,
    redirect_limit: u16,

    request_headers: RequestHeaders,
    response_headers: ResponseHeaders,
    return_code: i32,
    size: i64,
    body: Option<BodyReader>,
    connection_close: bool,
    observer: Option<Box<dyn ExchangeObserver>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        HttpClient {
            target: None,
            tls: TlsOptions::default(),
            session: None,
            reuse: true,
            must_reinit: false,
            user_agent: "httpc".to_string(),
            credentials: None,
            connect_timeout: Duration::from_millis(DEFAULT_TCP_TIMEOUT_MS),
            keep_alive: KeepAlive::default(),
            follow_redirects: FollowRedirects::Disabled,
            redirect_limit: 10,
            request_headers: RequestHeaders::new(),
            response_headers: ResponseHeaders::new(),
            return_code: 0,
            size: -1,
            body: None,
            connection_close: false,
            observer: None,
        }
    }

    // ------------------------------------------------------------------
    // Target configuration

    /// Configure the target from an absolute URL.
    ///
    /// `https` targets verify the peer against the platform trust
    /// store; use [`begin_with_ca`](Self::begin_with_ca) to pin a
    /// trust anchor.
    pub fn begin(&mut self, url: &str) -> bool {
        self.end();

        let Some(target) = Target::parse(url) else {
            debug!("failed to parse url: {}", url);
            return false;
        };
        trace!("target: {}", target);
        self.target = Some(target);
        self.tls = TlsOptions::default();
        true
    }

    /// Configure an `https` target with a PEM trust anchor.
    pub fn begin_with_ca(&mut self, url: &str, ca_cert_pem: &str) -> bool {
        self.end();

        let Some(target) = Target::parse(url) else {
            debug!("failed to parse url: {}", url);
            return false;
        };
        if !target.is_secure() {
            debug!("unexpected protocol: {}, expected https", target.scheme);
            return false;
        }
        if ca_cert_pem.is_empty() {
            return false;
        }

        self.target = Some(target);
        self.tls = TlsOptions {
            ca_cert_pem: Some(ca_cert_pem.to_string()),
            ..Default::default()
        };
        true
    }

    /// Configure a plain `http` target from host, port and path.
    pub fn begin_host(&mut self, host: &str, port: u16, path: &str) -> bool {
        self.end();
        self.target = Some(Target {
            scheme: "http".to_string(),
            host: host.to_string(),
            port,
            path: normalize_path(path),
        });
        self.tls = TlsOptions::default();
        true
    }

    /// Configure an `https` target from host, port and path with a PEM
    /// trust anchor.
    pub fn begin_host_with_ca(&mut self, host: &str, port: u16, path: &str, ca_cert_pem: &str) -> bool {
        if ca_cert_pem.is_empty() {
            return false;
        }
        self.end();
        self.target = Some(Target {
            scheme: "https".to_string(),
            host: host.to_string(),
            port,
            path: normalize_path(path),
        });
        self.tls = TlsOptions {
            ca_cert_pem: Some(ca_cert_pem.to_string()),
            ..Default::default()
        };
        true
    }

    /// Configure an `https` target with mutual TLS credentials.
    pub fn begin_host_mutual(
        &mut self,
        host: &str,
        port: u16,
        path: &str,
        ca_cert_pem: &str,
        client_cert_pem: &str,
        client_key_pem: &str,
    ) -> bool {
        if ca_cert_pem.is_empty() {
            return false;
        }
        self.end();
        self.target = Some(Target {
            scheme: "https".to_string(),
            host: host.to_string(),
            port,
            path: normalize_path(path),
        });
        self.tls = TlsOptions {
            ca_cert_pem: Some(ca_cert_pem.to_string()),
            client_cert_pem: Some(client_cert_pem.to_string()),
            client_key_pem: Some(client_key_pem.to_string()),
        };
        true
    }

    /// Re-target a reusable, already-initialized connection.
    ///
    /// Accepts an absolute URL or a `/`-rooted path. Per-response
    /// state and request-specific headers are reset, persistent
    /// request headers stay. When scheme, host or port change, the
    /// transport is torn down and re-established on the next send.
    pub fn set_url(&mut self, url: &str) -> bool {
        if !self.reuse || self.must_reinit {
            return false;
        }
        let Some(current) = self.target.clone() else {
            return false;
        };
        let Some(next) = current.resolve(url) else {
            debug!("failed to parse redirect target: {}", url);
            return false;
        };

        if current.same_connection(&next) {
            self.disconnect(true);
        } else {
            debug!("target moved to {}, full reconnect", next);
            self.disconnect(false);
            self.tls = TlsOptions::default();
        }

        self.request_headers.clear_request_specific();
        self.target = Some(next);
        true
    }

    // ------------------------------------------------------------------
    // Behavior configuration

    /// Keep the transport open across exchanges to the same host
    pub fn set_reuse(&mut self, reuse: bool) {
        self.reuse = reuse;
        self.must_reinit = false;
    }

    pub fn set_user_agent(&mut self, user_agent: &str) {
        self.user_agent = user_agent.to_string();
    }

    /// Configure Basic authentication credentials.
    ///
    /// Credentials are serialized internally; the `Authorization`
    /// header cannot be set through [`add_header`](Self::add_header).
    pub fn set_authorization(&mut self, user: &str, password: &str) {
        if !user.is_empty() {
            self.credentials = Some((user.to_string(), password.to_string()));
        }
    }

    /// Timeout applied to connect and to every transport wait
    pub fn set_connect_timeout(&mut self, timeout_ms: u64) {
        self.connect_timeout = Duration::from_millis(timeout_ms);
        if let Some(session) = self.session.as_mut() {
            session.set_timeout(Some(self.connect_timeout));
        }
    }

    /// TCP keep-alive options for subsequently established connections
    pub fn set_keep_alive(&mut self, enabled: bool, idle_ms: u64, interval_ms: u64, count: u32) {
        self.keep_alive = KeepAlive {
            enabled,
            idle: Duration::from_millis(idle_ms),
            interval: Duration::from_millis(interval_ms),
            count,
        };
    }

    pub fn set_follow_redirects(&mut self, follow: FollowRedirects) {
        self.follow_redirects = follow;
    }

    /// Maximum redirect hops followed within a single send
    pub fn set_redirect_limit(&mut self, limit: u16) {
        self.redirect_limit = limit;
    }

    /// Install the exchange observer
    pub fn set_observer(&mut self, observer: Box<dyn ExchangeObserver>) {
        self.observer = Some(observer);
    }

    // ------------------------------------------------------------------
    // Request headers

    /// Add a request header; see [`RequestHeaders::add`]
    pub fn add_header(&mut self, name: &str, value: &str, first: bool, replace: bool) {
        self.request_headers.add(name, value, first, replace);
    }

    /// Remove all request headers with this name
    pub fn remove_header(&mut self, name: &str) {
        self.request_headers.remove(name);
    }

    /// Drop every configured request header
    pub fn clear_request_headers(&mut self) {
        self.request_headers.clear();
    }

    // ------------------------------------------------------------------
    // Response headers

    /// Restrict which response headers are captured; clears previous
    /// captures
    pub fn collect_headers(&mut self, names: &[&str]) {
        self.response_headers.set_collect(names);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers.get(name)
    }

    pub fn header_at(&self, index: usize) -> Option<&str> {
        self.response_headers.value_at(index)
    }

    pub fn header_name_at(&self, index: usize) -> Option<&str> {
        self.response_headers.name_at(index)
    }

    pub fn header_count(&self) -> usize {
        self.response_headers.len()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.response_headers.has(name)
    }

    /// Redirect target captured from the last response
    pub fn get_location(&self) -> Option<&str> {
        self.response_headers.location()
    }

    // ------------------------------------------------------------------
    // Requests

    pub fn get(&mut self) -> i32 {
        self.send_request(Method::Get, &[])
    }

    pub fn post(&mut self, payload: &[u8]) -> i32 {
        self.send_request(Method::Post, payload)
    }

    pub fn put(&mut self, payload: &[u8]) -> i32 {
        self.send_request(Method::Put, payload)
    }

    pub fn patch(&mut self, payload: &[u8]) -> i32 {
        self.send_request(Method::Patch, payload)
    }

    /// Perform one exchange (plus redirect hops).
    ///
    /// Returns the HTTP status code, or a negative error code.
    pub fn send_request(&mut self, method: Method, payload: &[u8]) -> i32 {
        let result = match self.perform(method, payload) {
            Ok(status) => status as i32,
            Err(err) => self.fail(err),
        };
        if !self.reuse {
            self.must_reinit = true;
        }
        self.notify_complete(result);
        result
    }

    /// Perform one exchange streaming the body from a byte source.
    ///
    /// The upload length must be known up front; redirects are not
    /// followed since the source cannot be rewound.
    pub fn send_request_source(
        &mut self,
        method: Method,
        source: &mut dyn BodySource,
        size: usize,
    ) -> i32 {
        let result = match self.perform_source(method, source, size) {
            Ok(status) => status as i32,
            Err(err) => self.fail(err),
        };
        if !self.reuse {
            self.must_reinit = true;
        }
        self.notify_complete(result);
        result
    }

    fn perform(&mut self, method: Method, payload: &[u8]) -> Result<u16> {
        if !self.reuse && self.must_reinit {
            return Err(Error::NotConnected);
        }
        if self.target.is_none() {
            return Err(Error::ClientConfigError);
        }

        let mut method = method;
        let mut payload = payload;
        let mut hops: u16 = 0;

        loop {
            self.clear_exchange();
            debug!(
                "request {} {} (hop {})",
                method,
                self.target.as_ref().map(|t| t.to_string()).unwrap_or_default(),
                hops
            );

            let head_block = self.build_request_head(method, payload.len())?;
            self.connect()?;
            self.transmit_head(&head_block)?;

            if !payload.is_empty() {
                let session = self.session.as_mut().ok_or(Error::NotConnected)?;
                transfer::send_buffer(session, payload)?;
            }

            let status = self.read_response_head(method)?;
            self.notify_headers(status);

            let action = redirect_action(self.follow_redirects, method, status);
            if action == RedirectAction::None {
                return Ok(status);
            }

            let Some(location) = self
                .response_headers
                .location()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
            else {
                return Ok(status);
            };

            if hops >= self.redirect_limit {
                return Err(Error::RedirectLimitReached);
            }
            hops += 1;
            debug!("following redirect: '{}' hop {}", location, hops);

            // A reused connection must start the next hop clean: drain
            // the redirect body when it is delimited, otherwise drop
            // the transport.
            if self.size >= 0 || self.is_response_chunked() {
                self.flush_body();
            } else {
                self.disconnect(false);
            }

            if !self.set_url(&location) {
                debug!("failed setting URL for redirection");
                return Ok(status);
            }

            if action == RedirectAction::DowngradeToGet {
                method = if method == Method::Head {
                    Method::Head
                } else {
                    Method::Get
                };
                payload = &[];
            }
        }
    }

    fn perform_source(
        &mut self,
        method: Method,
        source: &mut dyn BodySource,
        size: usize,
    ) -> Result<u16> {
        if !self.reuse && self.must_reinit {
            return Err(Error::NotConnected);
        }
        if self.target.is_none() {
            return Err(Error::ClientConfigError);
        }

        self.clear_exchange();
        let head_block = self.build_request_head(method, size)?;
        self.connect()?;
        self.transmit_head(&head_block)?;

        let session = self.session.as_mut().ok_or(Error::NotConnected)?;
        transfer::send_source(session, source, size)?;

        let status = self.read_response_head(method)?;
        self.notify_headers(status);
        Ok(status)
    }

    // ------------------------------------------------------------------
    // Response body access

    /// Bytes readable without crossing the current framing unit
    pub fn available(&mut self) -> usize {
        match (self.body.as_mut(), self.session.as_mut()) {
            (Some(body), Some(session)) => body.available(session),
            _ => 0,
        }
    }

    /// Look at the next body byte without consuming it
    pub fn peek(&mut self) -> Option<u8> {
        let (Some(body), Some(session)) = (self.body.as_mut(), self.session.as_mut()) else {
            return None;
        };
        match body.peek(session) {
            Ok(byte) => byte,
            Err(err) => {
                debug!("peek failed: {}", err);
                None
            }
        }
    }

    /// Read one body byte
    pub fn read_byte(&mut self) -> Option<u8> {
        let (Some(body), Some(session)) = (self.body.as_mut(), self.session.as_mut()) else {
            return None;
        };
        match body.read_byte(session) {
            Ok(byte) => byte,
            Err(err) => {
                debug!("read failed: {}", err);
                None
            }
        }
    }

    /// Read body bytes into `buf`.
    ///
    /// Returns the byte count (0 once the body is exhausted) or a
    /// negative error code.
    pub fn read(&mut self, buf: &mut [u8]) -> i32 {
        let (Some(body), Some(session)) = (self.body.as_mut(), self.session.as_mut()) else {
            return 0;
        };
        match body.read(session, buf) {
            Ok(n) => n as i32,
            Err(err) => err.code(),
        }
    }

    /// Copy the whole remaining body to a sink.
    ///
    /// Returns the bytes written, or a negative error code. On success
    /// the per-exchange state is closed, preserving the transport for
    /// reuse.
    pub fn write_to_stream(&mut self, sink: &mut dyn std::io::Write) -> i64 {
        match self.copy_body(sink) {
            Ok(total) => total,
            Err(err) => self.fail(err) as i64,
        }
    }

    /// Entire remaining body as text (UTF-8, lossy).
    ///
    /// Returns an empty string when the body cannot be read or the
    /// buffer cannot be reserved.
    pub fn get_string(&mut self) -> String {
        let mut out: Vec<u8> = Vec::new();
        if self.size > 0 {
            if out.try_reserve_exact(self.size as usize + 1).is_err() {
                debug!("not enough memory to reserve a string, need {}", self.size + 1);
                return String::new();
            }
        }

        match self.copy_body(&mut out) {
            Ok(_) => String::from_utf8_lossy(&out).into_owned(),
            Err(err) => {
                self.fail(err);
                String::new()
            }
        }
    }

    /// Read and discard whatever is left of the body
    pub fn flush_body(&mut self) {
        if let (Some(body), Some(session)) = (self.body.as_mut(), self.session.as_mut()) {
            body.discard(session);
        }
    }

    /// Declared body size; -1 when unknown (chunked or no length
    /// header)
    pub fn get_size(&self) -> i64 {
        self.size
    }

    /// Status or error code recorded by the last exchange
    pub fn get_return_code(&self) -> i32 {
        self.return_code
    }

    pub fn is_response_chunked(&self) -> bool {
        self.body.as_ref().map(BodyReader::is_chunked).unwrap_or(false)
    }

    pub fn get_current_chunk_size(&self) -> usize {
        self.body.as_ref().map(BodyReader::current_chunk_size).unwrap_or(0)
    }

    pub fn get_current_chunk_consumed(&self) -> usize {
        self.body
            .as_ref()
            .map(BodyReader::current_chunk_consumed)
            .unwrap_or(0)
    }

    pub fn get_current_chunk_remaining(&self) -> usize {
        self.body
            .as_ref()
            .map(BodyReader::current_chunk_remaining)
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Lifecycle

    /// Whether a transport is currently established
    pub fn connected(&self) -> bool {
        self.session.is_some()
    }

    /// Tear everything down; the configured request headers persist.
    pub fn end(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.close();
        }
        self.must_reinit = false;
        self.clear_exchange();
    }

    /// Close per-exchange state.
    ///
    /// With `preserve_connection` the transport stays open for reuse,
    /// unless reuse is disabled or the server asked for the connection
    /// to close.
    pub fn disconnect(&mut self, preserve_connection: bool) {
        let keep = preserve_connection && self.reuse && !self.connection_close;
        if !keep {
            if let Some(mut session) = self.session.take() {
                let _ = session.close();
            }
        }
        self.clear_exchange();
    }

    /// Close the current exchange, keeping the client ready for reuse
    pub fn close_connection(&mut self) {
        self.disconnect(true);
    }

    // ------------------------------------------------------------------
    // Internals

    fn clear_exchange(&mut self) {
        self.response_headers.clear_captured();
        self.return_code = 0;
        self.size = -1;
        self.body = None;
    }

    fn fail(&mut self, err: Error) -> i32 {
        error!("error({}): {}", err.code(), error_to_string(err.code()));
        self.end();
        self.return_code = err.code();
        err.code()
    }

    fn notify_headers(&mut self, status: u16) {
        if let Some(mut observer) = self.observer.take() {
            observer.on_headers(status, &self.response_headers);
            self.observer = Some(observer);
        }
    }

    fn notify_complete(&mut self, result: i32) {
        if let Some(mut observer) = self.observer.take() {
            observer.on_complete(result);
            self.observer = Some(observer);
        }
    }

    /// Establish the transport, or keep the current one when reuse is
    /// enabled.
    fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            if self.reuse {
                trace!("reusing established connection");
                return Ok(());
            }
            if let Some(mut session) = self.session.take() {
                let _ = session.close();
            }
        }

        let target = self.target.clone().ok_or(Error::ClientConfigError)?;
        debug!("connecting to {}:{}", target.host, target.port);

        let stream = net::connect(&target.host, target.port, self.connect_timeout, &self.keep_alive)
            .map_err(|err| {
                warn!("connect failed: {}", err);
                Error::ConnectionRefused
            })?;

        let transport = if target.is_secure() {
            let tls = TlsSessionOps::connect(stream, &target.host, &self.tls).map_err(|err| {
                warn!("TLS handshake failed: {}", err);
                Error::ConnectionRefused
            })?;
            Transport::Tls(tls)
        } else {
            Transport::Plain(FdSessionOps::new(stream))
        };

        let mut session = HttpSession::new(transport);
        session.set_timeout(Some(self.connect_timeout));
        self.session = Some(session);
        self.connection_close = false;
        Ok(())
    }

    /// Serialize the request line and header block.
    fn build_request_head(&self, method: Method, payload_len: usize) -> Result<Vec<u8>> {
        let target = self.target.as_ref().ok_or(Error::ClientConfigError)?;

        let mut head = String::with_capacity(256);
        head.push_str(method.as_str());
        head.push(' ');
        head.push_str(&target.path);
        head.push_str(" HTTP/1.1");
        head.push_str(CRLF);

        head.push_str("Host: ");
        head.push_str(&target.host_header());
        head.push_str(CRLF);

        head.push_str("User-Agent: ");
        head.push_str(&self.user_agent);
        head.push_str(CRLF);

        head.push_str("Connection: ");
        head.push_str(if self.reuse { "keep-alive" } else { "close" });
        head.push_str(CRLF);

        head.push_str("Accept-Encoding: identity");
        head.push_str(CRLF);

        if let Some((user, password)) = &self.credentials {
            let token = openssl::base64::encode_block(format!("{}:{}", user, password).as_bytes());
            head.push_str("Authorization: Basic ");
            head.push_str(&token);
            head.push_str(CRLF);
        }

        let engine_length = payload_len > 0 || method.carries_body();
        if engine_length {
            head.push_str("Content-Length: ");
            head.push_str(&payload_len.to_string());
            head.push_str(CRLF);
        }

        for (name, value) in self.request_headers.iter() {
            // The engine's own length always wins.
            if engine_length && name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            if !valid_header_name(name) || !valid_header_value(value) {
                warn!("invalid request header: {}", name);
                return Err(Error::SendHeaderFailed);
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str(CRLF);
        }

        head.push_str(CRLF);
        Ok(head.into_bytes())
    }

    /// Transmit the serialized head block.
    fn transmit_head(&mut self, head: &[u8]) -> Result<()> {
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;

        let mut written = 0;
        while written < head.len() {
            let n = session
                .write(&head[written..])
                .map_err(|_| Error::SendHeaderFailed)?;
            if n == 0 {
                return Err(Error::SendHeaderFailed);
            }
            written += n;
        }
        trace!("sent {} header bytes", written);
        Ok(())
    }

    /// Block until the full response header block is in, then set up
    /// the body cursor.
    fn read_response_head(&mut self, method: Method) -> Result<u16> {
        let mut parser = ResponseHeaderParser::new();
        let mut buf = [0u8; RX_BUFFER_SIZE];

        let head = loop {
            let session = self.session.as_mut().ok_or(Error::NotConnected)?;
            let n = match session.read(&mut buf) {
                Ok(n) => n,
                Err(Error::ReadTimeout) => return Err(Error::ReadTimeout),
                Err(_) => return Err(Error::FetchHeadersFailed),
            };
            if n == 0 {
                // Peer closed without a status line: nothing spoke HTTP.
                return Err(if parser.started() {
                    Error::FetchHeadersFailed
                } else {
                    Error::NoHttpServer
                });
            }

            if let Some(head) = parser.feed(&buf[..n], &mut self.response_headers)? {
                break head;
            }
        };

        debug!("status {} length {}", head.status, head.content_length);

        let has_body = method != Method::Head && head.status != 204 && head.status != 304;
        let declared = if has_body { head.content_length } else { 0 };
        let chunked = head.chunked && has_body;

        self.return_code = head.status as i32;
        self.size = declared;
        self.connection_close = head.connection_close;
        self.body = Some(BodyReader::new(chunked, declared, parser.take_remainder()));

        Ok(head.status)
    }

    fn copy_body(&mut self, sink: &mut dyn std::io::Write) -> Result<i64> {
        let body = self.body.as_mut().ok_or(Error::NoBodySink)?;
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;
        let total = body.copy_to(session, sink)?;

        if self.size < 0 {
            self.size = total;
        }
        // Body fully drained: release the exchange, keep the handle.
        self.disconnect(true);
        Ok(total)
    }
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b > 32 && b < 127 && b != b':')
}

fn valid_header_value(value: &str) -> bool {
    value.bytes().all(|b| b != b'\r' && b != b'\n' && (b == b'\t' || b >= 32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_client() -> HttpClient {
        let mut client = HttpClient::new();
        assert!(client.begin("http://example.com:8080/data?x=1"));
        client
    }

    fn head_string(client: &HttpClient, method: Method, payload_len: usize) -> String {
        String::from_utf8(client.build_request_head(method, payload_len).unwrap()).unwrap()
    }

    #[test]
    fn test_request_head_shape() {
        let client = configured_client();
        let head = head_string(&client, Method::Get, 0);

        assert!(head.starts_with("GET /data?x=1 HTTP/1.1\r\n"));
        assert!(head.contains("Host: example.com:8080\r\n"));
        assert!(head.contains("User-Agent: httpc\r\n"));
        assert!(head.contains("Connection: keep-alive\r\n"));
        assert!(head.contains("Accept-Encoding: identity\r\n"));
        assert!(!head.contains("Content-Length"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_request_head_content_length_for_body_methods() {
        let client = configured_client();

        let head = head_string(&client, Method::Post, 12);
        assert!(head.starts_with("POST /data?x=1 HTTP/1.1\r\n"));
        assert!(head.contains("Content-Length: 12\r\n"));

        // Body-carrying methods announce a length even with no payload.
        let head = head_string(&client, Method::Put, 0);
        assert!(head.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn test_reserved_headers_never_serialized() {
        let mut client = configured_client();
        client.add_header("Host", "evil.example", false, true);
        client.add_header("user-agent", "spoofed", false, true);
        client.add_header("Connection", "upgrade", false, true);
        client.add_header("Authorization", "Bearer stolen", false, true);
        client.add_header("Accept-Encoding", "gzip", false, true);
        client.add_header("X-Custom", "kept", false, true);

        let head = head_string(&client, Method::Get, 0);
        assert!(!head.contains("evil.example"));
        assert!(!head.contains("spoofed"));
        assert!(!head.contains("upgrade"));
        assert!(!head.contains("stolen"));
        assert!(!head.contains("gzip"));
        assert!(head.contains("X-Custom: kept\r\n"));
        // The managed versions are still present exactly once.
        assert_eq!(head.matches("Host: ").count(), 1);
        assert_eq!(head.matches("User-Agent: ").count(), 1);
    }

    #[test]
    fn test_basic_authorization_serialized() {
        let mut client = configured_client();
        client.set_authorization("user", "pass");

        let head = head_string(&client, Method::Get, 0);
        // base64("user:pass")
        assert!(head.contains("Authorization: Basic dXNlcjpwYXNz\r\n"));
    }

    #[test]
    fn test_caller_content_length_does_not_duplicate() {
        let mut client = configured_client();
        client.add_header("Content-Length", "999", false, true);

        let head = head_string(&client, Method::Post, 4);
        assert_eq!(head.matches("Content-Length: ").count(), 1);
        assert!(head.contains("Content-Length: 4\r\n"));
    }

    #[test]
    fn test_invalid_header_value_fails_serialization() {
        let mut client = configured_client();
        client.add_header("X-Bad", "evil\r\nInjected: yes", false, true);

        let result = client.build_request_head(Method::Get, 0);
        assert!(matches!(result, Err(Error::SendHeaderFailed)));
    }

    #[test]
    fn test_connection_close_when_reuse_disabled() {
        let mut client = configured_client();
        client.set_reuse(false);

        let head = head_string(&client, Method::Get, 0);
        assert!(head.contains("Connection: close\r\n"));
    }

    #[test]
    fn test_redirect_action_table() {
        use FollowRedirects::*;
        use RedirectAction::*;

        // Disabled never follows
        assert_eq!(redirect_action(Disabled, Method::Get, 301), None);
        assert_eq!(redirect_action(Disabled, Method::Post, 302), None);

        // 301/307 keep the method only for GET/HEAD under Strict
        assert_eq!(redirect_action(Strict, Method::Get, 301), SameMethod);
        assert_eq!(redirect_action(Strict, Method::Head, 307), SameMethod);
        assert_eq!(redirect_action(Strict, Method::Post, 301), None);
        assert_eq!(redirect_action(Strict, Method::Put, 307), None);

        // Force lifts the method restriction
        assert_eq!(redirect_action(Force, Method::Post, 301), SameMethod);
        assert_eq!(redirect_action(Force, Method::Put, 307), SameMethod);

        // 302/303 always downgrade
        assert_eq!(redirect_action(Strict, Method::Post, 302), DowngradeToGet);
        assert_eq!(redirect_action(Strict, Method::Get, 303), DowngradeToGet);
        assert_eq!(redirect_action(Force, Method::Post, 303), DowngradeToGet);

        // Non-redirect statuses pass through
        assert_eq!(redirect_action(Force, Method::Get, 200), None);
        assert_eq!(redirect_action(Strict, Method::Get, 308), None);
    }

    #[test]
    fn test_send_without_begin_is_config_error() {
        let mut client = HttpClient::new();
        assert_eq!(client.get(), Error::ClientConfigError.code());
    }

    #[test]
    fn test_set_url_requires_reuse() {
        let mut client = configured_client();
        client.set_reuse(false);
        assert!(!client.set_url("http://example.com/other"));
    }

    #[test]
    fn test_set_url_keeps_persistent_headers() {
        let mut client = configured_client();
        client.add_header("X-Api-Key", "secret", false, true);
        client.add_header("Content-Type", "application/json", false, true);

        assert!(client.set_url("/other"));
        let head = head_string(&client, Method::Get, 0);
        assert!(head.starts_with("GET /other HTTP/1.1\r\n"));
        assert!(head.contains("X-Api-Key: secret\r\n"));
        assert!(!head.contains("Content-Type"));
    }

    #[test]
    fn test_begin_rejects_bad_scheme() {
        let mut client = HttpClient::new();
        assert!(!client.begin("ftp://example.com/file"));
        assert!(!client.begin_with_ca("http://example.com/", "dummy"));
        assert!(!client.begin_host_with_ca("example.com", 443, "/", ""));
    }
}
