//! HTTP vocabulary and the request/response value types.
//!
//! Requests and responses share a [`Message`] component (version, headers,
//! content). The [`HttpMessage`] trait exposes the shared accessors on both
//! without any dynamic dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;
use crate::uri::Uri;

/// Name of the header kept in sync with the content length.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Request methods recognised on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Connect,
        Method::Options,
        Method::Trace,
        Method::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = CodecError;

    /// Method tokens are case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .copied()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| CodecError::Malformed(format!("Unknown HTTP method: {}", s)))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol versions. Only `HTTP/1.1` is accepted by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Version {
    Http10,
    #[default]
    Http11,
    Http20,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
            Version::Http20 => "HTTP/2.0",
        }
    }
}

impl FromStr for Version {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            "HTTP/2.0" => Ok(Version::Http20),
            _ => Err(CodecError::Malformed(format!("Unknown HTTP version: {}", s))),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes the server emits, each with a fixed reason phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Created,
    NoContent,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    HttpVersionNotSupported,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::BadGateway => 502,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::GatewayTimeout => 504,
            StatusCode::HttpVersionNotSupported => 505,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::GatewayTimeout => "Gateway Timeout",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

/// Renders the status line fragment, e.g. `404 Not Found`.
impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason())
    }
}

/// Version, headers and content shared by requests and responses.
///
/// Header keys are case-sensitive as stored and a repeated key keeps only the
/// last value. `Content-Length` always tracks the content set through
/// [`set_content`](Message::set_content) and [`clear_content`](Message::clear_content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    version: Version,
    headers: BTreeMap<String, String>,
    content: Vec<u8>,
}

impl Message {
    pub fn new() -> Self {
        let mut message = Message {
            version: Version::Http11,
            headers: BTreeMap::new(),
            content: Vec::new(),
        };
        message.clear_content();
        message
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Empty keys are ignored.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !key.is_empty() {
            self.headers.insert(key, value.into());
        }
    }

    pub fn remove_header(&mut self, key: &str) {
        self.headers.remove(key);
    }

    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = content.into();
        let length = self.content.len().to_string();
        self.set_header(CONTENT_LENGTH, length);
    }

    pub fn clear_content(&mut self) {
        self.content.clear();
        self.set_header(CONTENT_LENGTH, "0");
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn content_length(&self) -> usize {
        self.content.len()
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::new()
    }
}

/// Shared accessors over the [`Message`] embedded in requests and responses.
pub trait HttpMessage {
    fn message(&self) -> &Message;

    fn message_mut(&mut self) -> &mut Message;

    fn version(&self) -> Version {
        self.message().version()
    }

    fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.message_mut().set_header(key, value)
    }

    fn remove_header(&mut self, key: &str) {
        self.message_mut().remove_header(key)
    }

    fn clear_headers(&mut self) {
        self.message_mut().clear_headers()
    }

    fn header(&self, key: &str) -> Option<&str> {
        self.message().header(key)
    }

    fn headers(&self) -> &BTreeMap<String, String> {
        self.message().headers()
    }

    fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.message_mut().set_content(content)
    }

    fn clear_content(&mut self) {
        self.message_mut().clear_content()
    }

    fn content(&self) -> &[u8] {
        self.message().content()
    }

    fn content_length(&self) -> usize {
        self.message().content_length()
    }
}

/// A parsed (or client-built) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    message: Message,
}

impl HttpRequest {
    pub fn new(method: Method, uri: impl Into<Uri>) -> Self {
        HttpRequest {
            method,
            uri: uri.into(),
            message: Message::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: impl Into<Uri>) {
        self.uri = uri.into();
    }
}

impl HttpMessage for HttpRequest {
    fn message(&self) -> &Message {
        &self.message
    }

    fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }
}

/// A response produced by a handler or by the server itself.
///
/// `204 No Content` responses never carry a body: constructing one, or
/// switching an existing response to that status, clears the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: StatusCode,
    message: Message,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        HttpResponse {
            status,
            message: Message::new(),
        }
    }

    /// Builds a response with a body in one step.
    ///
    /// ```
    /// # use ferrule::{HttpMessage, HttpResponse, StatusCode};
    /// let response = HttpResponse::with_content(StatusCode::Ok, "test\n");
    /// assert_eq!(response.header("Content-Length"), Some("5"));
    /// ```
    pub fn with_content(status: StatusCode, content: impl Into<Vec<u8>>) -> Self {
        let mut response = HttpResponse::new(status);
        response.set_content(content);
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        if status == StatusCode::NoContent {
            self.clear_content();
        }
    }
}

impl HttpMessage for HttpResponse {
    fn message(&self) -> &Message {
        &self.message
    }

    fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        if self.status == StatusCode::NoContent {
            self.message.clear_content();
        } else {
            self.message.set_content(content);
        }
    }
}
