//! httpc - blocking HTTP/1.1 client engine
//!
//! This crate drives HTTP/1.1 request/response exchanges over plain
//! TCP or TLS transports, with connection reuse, redirect following
//! and streaming body decoding.

pub mod http;
pub mod net;
