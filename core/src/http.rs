//! HTTP transport types for the host-does-IO path.
//!
//! # Design
//! These types describe an envelope request and its raw response as plain
//! data. `RequestExecutor::build_*` produces an `HttpRequest` and
//! `RequestExecutor::parse_response` consumes an `HttpResponse`, so a host
//! with its own HTTP stack can drive the protocol without going through
//! reqwest. The async methods on `RequestExecutor` use the same two halves.

use std::fmt;

/// HTTP method for an envelope request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `url` is final: the query string has already been appended.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}
