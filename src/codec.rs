//! Wire codec for HTTP/1.x messages.
//!
//! Pure functions over byte slices; no I/O happens here. The reactor hands the
//! bytes of one receive call to [`Decode::decode`] and copies the output of
//! [`Encode::encode`] into the connection's write buffer.

use std::io::Write;

use crate::error::{CodecError, CodecResult};
use crate::http::{HttpMessage, HttpRequest, HttpResponse, Message, Method, Version};
use crate::uri::Uri;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Serializes a value into wire bytes.
pub trait Encode {
    /// Appends the wire form of `self` to `dst`.
    fn encode(&self, dst: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut dst = Vec::new();
        self.encode(&mut dst);
        dst
    }
}

/// Parses a value from wire bytes.
pub trait Decode: Sized {
    fn decode(src: &[u8]) -> CodecResult<Self>;
}

/// `<version> <code> <reason>\r\n`, headers, blank line, raw content.
impl Encode for HttpResponse {
    fn encode(&self, dst: &mut Vec<u8>) {
        // Writing into a Vec cannot fail.
        let _ = write!(dst, "{} {}\r\n", self.version(), self.status());
        encode_tail(self.message(), dst);
    }
}

/// `<method> <target> <version>\r\n`, headers, blank line, raw content.
impl Encode for HttpRequest {
    fn encode(&self, dst: &mut Vec<u8>) {
        let _ = write!(dst, "{} {} {}\r\n", self.method(), self.uri(), self.version());
        encode_tail(self.message(), dst);
    }
}

fn encode_tail(message: &Message, dst: &mut Vec<u8>) {
    for (key, value) in message.headers() {
        let _ = write!(dst, "{}: {}\r\n", key, value);
    }
    dst.extend_from_slice(CRLF);
    dst.extend_from_slice(message.content());
}

impl Decode for HttpRequest {
    /// Parses one request from the bytes of a single receive.
    ///
    /// The content is everything after the blank line; `Content-Length` is
    /// not consulted. A request without a blank line decodes with no headers
    /// and no content.
    ///
    /// # Errors
    /// - `CodecError::Malformed` for a missing start line terminator, a start
    ///   line that is not exactly three tokens, or an unknown method or
    ///   version token
    /// - `CodecError::UnsupportedVersion` for any known version but HTTP/1.1
    fn decode(src: &[u8]) -> CodecResult<Self> {
        let line_end = find(src, CRLF, 0).ok_or_else(|| {
            CodecError::Malformed("Invalid HTTP request: missing start line".to_string())
        })?;

        let start_line = std::str::from_utf8(&src[..line_end])
            .map_err(|_| CodecError::Malformed("Invalid start line format".to_string()))?;

        let tokens: Vec<&str> = start_line.split_whitespace().collect();
        let &[method, target, version] = tokens.as_slice() else {
            return Err(CodecError::Malformed("Invalid start line format".to_string()));
        };

        let method: Method = method.parse()?;
        let mut request = HttpRequest::new(method, Uri::parse(target));

        let version: Version = version.parse()?;
        if version != request.version() {
            return Err(CodecError::UnsupportedVersion(format!(
                "Unsupported HTTP version: {}",
                version
            )));
        }

        // Searching from the start-line CRLF itself lets a request with no
        // headers (`POST / HTTP/1.1\r\n\r\nbody`) keep its body.
        let Some(header_end) = find(src, HEADER_END, line_end) else {
            request.clear_content();
            return Ok(request);
        };

        let header_start = (line_end + CRLF.len()).min(header_end);
        let header_block = String::from_utf8_lossy(&src[header_start..header_end]);
        for line in header_block.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };

            let key = strip_whitespace(key);
            if !key.is_empty() {
                request.set_header(key, strip_whitespace(value));
            }
        }

        request.set_content(&src[header_end + HEADER_END.len()..]);
        Ok(request)
    }
}

/// Removes every whitespace character, interior ones included.
///
/// A value such as `My Browser` comes out as `MyBrowser`.
fn strip_whitespace(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c'))
        .collect()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{StatusCode, CONTENT_LENGTH};

    #[test]
    fn test_encode_response() {
        let mut response = HttpResponse::new(StatusCode::Ok);
        response.set_header("Content-Type", "text/plain");
        response.set_content("test\n");

        let bytes = response.to_bytes();
        assert_eq!(
            bytes,
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\n\r\ntest\n"
        );
        assert_eq!(bytes, response.to_bytes());
    }

    #[test]
    fn test_decode_simple_get() {
        let request = HttpRequest::decode(b"GET /Index?Page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .unwrap();

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.uri().path(), "/index");
        assert_eq!(request.uri().query(), "page=2");
        assert_eq!(request.version(), Version::Http11);
        assert_eq!(request.header("Host"), Some("example.com"));
        assert_eq!(request.header(CONTENT_LENGTH), Some("0"));
        assert!(request.content().is_empty());
    }

    /// The body is taken verbatim from the bytes after the blank line.
    #[test]
    fn test_decode_body_ignores_declared_length() {
        let request =
            HttpRequest::decode(b"POST /api HTTP/1.1\r\nContent-Length: 99\r\n\r\nhello").unwrap();

        assert_eq!(request.content(), b"hello");
        assert_eq!(request.header(CONTENT_LENGTH), Some("5"));
    }

    #[test]
    fn test_decode_body_without_headers() {
        let request = HttpRequest::decode(b"PUT /x HTTP/1.1\r\n\r\npayload").unwrap();
        assert_eq!(request.content(), b"payload");
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn test_decode_without_blank_line() {
        let request = HttpRequest::decode(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap();
        assert!(request.header("Host").is_none());
        assert!(request.content().is_empty());
    }

    #[test]
    fn test_decode_missing_start_line() {
        let err = HttpRequest::decode(b"GET / HTTP/1.1").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_decode_bad_tokenization() {
        for raw in [&b"GET /\r\n\r\n"[..], b"GET / HTTP/1.1 extra\r\n\r\n", b"\r\n\r\n"] {
            let err = HttpRequest::decode(raw).unwrap_err();
            assert!(matches!(err, CodecError::Malformed(_)), "{:?}", err);
        }
    }

    /// An unknown method is malformed even when the version is also wrong.
    #[test]
    fn test_decode_unknown_method() {
        let err = HttpRequest::decode(b"FOOBAR / HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err, CodecError::Malformed("Unknown HTTP method: FOOBAR".to_string()));

        let err = HttpRequest::decode(b"FOOBAR / HTTP/1.0\r\n\r\n").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_decode_unsupported_version() {
        for raw in [&b"GET / HTTP/1.0\r\n\r\n"[..], b"GET / HTTP/2.0\r\n\r\n"] {
            let err = HttpRequest::decode(raw).unwrap_err();
            assert!(matches!(err, CodecError::UnsupportedVersion(_)), "{:?}", err);
        }

        let err = HttpRequest::decode(b"GET / HTTP/3\r\n\r\n").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_decode_header_rules() {
        let raw = b"GET / HTTP/1.1\r\nNoColonHere\r\n : empty-key\r\nX-A: 1\r\nX-A: 2\r\nX-B:\tspaced\r\n\r\n";
        let request = HttpRequest::decode(raw).unwrap();

        assert_eq!(request.header("X-A"), Some("2"));
        assert_eq!(request.header("X-B"), Some("spaced"));
        assert!(request.header("NoColonHere").is_none());
        assert_eq!(request.headers().len(), 3);
    }

    /// Interior whitespace in header values is removed, not just the edges.
    /// Values with spaces do not survive a decode unchanged.
    #[test]
    fn test_decode_strips_interior_whitespace() {
        let request =
            HttpRequest::decode(b"GET / HTTP/1.1\r\nUser-Agent: My Browser\r\n\r\n").unwrap();
        assert_eq!(request.header("User-Agent"), Some("MyBrowser"));
    }

    #[test]
    fn test_request_round_trip() {
        let mut request = HttpRequest::new(Method::Patch, "/items?id=7");
        request.set_header("Host", "localhost");
        request.set_header("X-Token", "abc123");
        request.set_content("{\"name\":\"ferrule\"}");

        let decoded = HttpRequest::decode(&request.to_bytes()).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.uri().query(), "id=7");
    }
}
