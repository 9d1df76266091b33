//! Transport-neutral HTTP request/response model.
//!
//! The server router consumes these and the client transport produces them;
//! any real HTTP stack only has to convert to and from these two structs.

use std::fmt;

/// Route of the send endpoint.
pub const SEND_ROUTE: &str = "/api/messages/send";
/// Route of the delta fetch endpoint.
pub const DELTA_ROUTE: &str = "/api/messages/delta";
/// Route of the history endpoint.
pub const HISTORY_ROUTE: &str = "/api/messages/history";
/// Route of the conversation list endpoint.
pub const CONVERSATIONS_ROUTE: &str = "/api/conversations";

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// An HTTP request carrying a CBOR body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Request path, e.g. `/api/messages/delta`.
    pub path: String,
    /// Raw `Authorization` header value, if any.
    pub authorization: Option<String>,
    /// CBOR body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a POST request.
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            authorization: None,
            body,
        }
    }

    /// Attaches a bearer token.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {}", token));
        self
    }
}

/// An HTTP response carrying a CBOR body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// CBOR body (a response message or an `ErrorBody`).
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a 200 response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// Creates a response with an arbitrary status.
    pub fn with_status(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
