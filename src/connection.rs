//! Per-connection state machine.
//!
//! A connection is always in exactly one phase and owns exactly one
//! [`ConnectionBuffer`] for it. Moving between phases drops the old buffer and
//! installs a fresh one, so a read-phase and a write-phase buffer never exist
//! for the same socket at the same time.
//!
//! ```text
//!   accept ──► Reading ──(bytes)──► Writing ──(all sent)──► Reading ...
//!                 │                    │
//!                 └──(eof / error)─────┴──(error / hang-up)──► Closed
//! ```

use std::io::{self, Read, Write};

/// Fixed-capacity byte buffer for one phase of a connection.
///
/// `cursor` counts bytes already consumed, `length` the bytes still pending
/// after the cursor.
#[derive(Debug)]
pub struct ConnectionBuffer {
    buffer: Box<[u8]>,
    length: usize,
    cursor: usize,
}

impl ConnectionBuffer {
    /// An empty buffer ready to receive into.
    pub fn new(capacity: usize) -> Self {
        ConnectionBuffer {
            buffer: vec![0; capacity].into_boxed_slice(),
            length: 0,
            cursor: 0,
        }
    }

    /// A buffer holding `bytes` to be sent, cut to `capacity`.
    ///
    /// Returns the buffer and whether anything was cut off.
    pub fn outbound(bytes: &[u8], capacity: usize) -> (Self, bool) {
        let mut unit = ConnectionBuffer::new(capacity);
        let length = bytes.len().min(capacity);
        unit.buffer[..length].copy_from_slice(&bytes[..length]);
        unit.length = length;
        (unit, length < bytes.len())
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes between the cursor and the end of the valid region.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.cursor..self.cursor + self.length]
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.length);
        self.cursor += n;
        self.length -= n;
    }
}

/// The phase a connection is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reading,
    Writing,
}

/// What the reactor must do with the socket after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Arm for read readiness.
    Read,
    /// Arm for write readiness.
    Write,
    /// Deregister and close the socket.
    Close(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    HangUp,
    ReceiveFailed(io::ErrorKind),
    SendFailed(io::ErrorKind),
}

#[derive(Debug)]
enum State {
    Reading(ConnectionBuffer),
    Writing(ConnectionBuffer),
}

/// A socket together with the buffer of its current phase.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    state: State,
    buffer_size: usize,
}

impl<S> Connection<S>
where
    S: Read + Write,
{
    /// A freshly accepted connection, waiting for its first request.
    pub fn new(stream: S, buffer_size: usize) -> Self {
        Connection {
            stream,
            state: State::Reading(ConnectionBuffer::new(buffer_size)),
            buffer_size,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Reading(_) => Phase::Reading,
            State::Writing(_) => Phase::Writing,
        }
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &ConnectionBuffer {
        match &self.state {
            State::Reading(unit) | State::Writing(unit) => unit,
        }
    }

    #[cfg(test)]
    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Handles read readiness with a single receive.
    ///
    /// On data, `respond` turns the received bytes into response bytes, which
    /// replace the read buffer as the write-phase buffer.
    pub fn on_readable<F>(&mut self, respond: F) -> Next
    where
        F: FnOnce(&[u8]) -> Vec<u8>,
    {
        let State::Reading(unit) = &mut self.state else {
            return Next::Write;
        };

        match self.stream.read(&mut unit.buffer) {
            Ok(0) => Next::Close(CloseReason::PeerClosed),
            Ok(n) => {
                unit.cursor = 0;
                unit.length = n;

                let response = respond(unit.pending());
                let (outbound, truncated) = ConnectionBuffer::outbound(&response, self.buffer_size);
                if truncated {
                    log::warn!(
                        "response of {} bytes truncated to {} byte buffer",
                        response.len(),
                        self.buffer_size
                    );
                }

                self.state = State::Writing(outbound);
                Next::Write
            }
            Err(err) if is_transient(&err) => Next::Read,
            Err(err) => Next::Close(CloseReason::ReceiveFailed(err.kind())),
        }
    }

    /// Handles write readiness with a single send of the pending bytes.
    ///
    /// A partial send keeps the remainder for the next write readiness; a
    /// complete one starts a new read phase on the same socket.
    pub fn on_writable(&mut self) -> Next {
        let State::Writing(unit) = &mut self.state else {
            return Next::Read;
        };

        match self.stream.write(unit.pending()) {
            Ok(n) if n >= unit.len() => {
                self.state = State::Reading(ConnectionBuffer::new(self.buffer_size));
                Next::Read
            }
            Ok(0) => Next::Close(CloseReason::SendFailed(io::ErrorKind::WriteZero)),
            Ok(n) => {
                unit.advance(n);
                Next::Write
            }
            Err(err) if is_transient(&err) => Next::Write,
            Err(err) => Next::Close(CloseReason::SendFailed(err.kind())),
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory stream: reads come from scripted chunks, writes are accepted
    /// up to a per-call limit.
    #[derive(Default)]
    struct MockStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        write_limits: VecDeque<io::Result<usize>>,
        written: Vec<u8>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Some(Err(err)) => Err(err),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let limit = match self.write_limits.pop_front() {
                Some(limit) => limit?,
                None => buf.len(),
            };
            let n = limit.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn echo(raw: &[u8]) -> Vec<u8> {
        raw.to_vec()
    }

    #[test]
    fn test_read_then_write_then_read_again() {
        let mut stream = MockStream::default();
        stream.reads.push_back(Ok(b"ping".to_vec()));
        let mut conn = Connection::new(stream, 64);
        assert_eq!(conn.phase(), Phase::Reading);

        assert_eq!(conn.on_readable(echo), Next::Write);
        assert_eq!(conn.phase(), Phase::Writing);
        assert_eq!(conn.buffer().pending(), b"ping");

        assert_eq!(conn.on_writable(), Next::Read);
        assert_eq!(conn.phase(), Phase::Reading);
        assert!(conn.buffer().is_empty());
        assert_eq!(conn.stream().written, b"ping");
    }

    /// A partial send resumes exactly where it stopped.
    #[test]
    fn test_partial_write_resumes_with_suffix() {
        let mut stream = MockStream::default();
        stream.reads.push_back(Ok(b"0123456789".to_vec()));
        stream.write_limits.push_back(Ok(3));
        stream.write_limits.push_back(Err(io::ErrorKind::WouldBlock.into()));
        stream.write_limits.push_back(Ok(4));
        let mut conn = Connection::new(stream, 64);

        assert_eq!(conn.on_readable(echo), Next::Write);

        assert_eq!(conn.on_writable(), Next::Write);
        assert_eq!(conn.buffer().cursor(), 3);
        assert_eq!(conn.buffer().pending(), b"3456789");

        assert_eq!(conn.on_writable(), Next::Write);
        assert_eq!(conn.buffer().pending(), b"3456789");

        assert_eq!(conn.on_writable(), Next::Write);
        assert_eq!(conn.buffer().pending(), b"789");

        assert_eq!(conn.on_writable(), Next::Read);
        assert_eq!(conn.stream().written, b"0123456789");
    }

    #[test]
    fn test_would_block_read_keeps_reading() {
        let mut conn = Connection::new(MockStream::default(), 16);
        let called = std::cell::Cell::new(false);

        let next = conn.on_readable(|raw| {
            called.set(true);
            raw.to_vec()
        });
        assert_eq!(next, Next::Read);
        assert_eq!(conn.phase(), Phase::Reading);
        assert!(!called.get());
    }

    #[test]
    fn test_peer_close_and_errors_close() {
        let mut stream = MockStream::default();
        stream.reads.push_back(Ok(Vec::new()));
        let mut conn = Connection::new(stream, 16);
        assert_eq!(conn.on_readable(echo), Next::Close(CloseReason::PeerClosed));

        let mut stream = MockStream::default();
        stream
            .reads
            .push_back(Err(io::ErrorKind::ConnectionReset.into()));
        let mut conn = Connection::new(stream, 16);
        assert_eq!(
            conn.on_readable(echo),
            Next::Close(CloseReason::ReceiveFailed(io::ErrorKind::ConnectionReset))
        );

        let mut stream = MockStream::default();
        stream.reads.push_back(Ok(b"x".to_vec()));
        stream
            .write_limits
            .push_back(Err(io::ErrorKind::BrokenPipe.into()));
        let mut conn = Connection::new(stream, 16);
        conn.on_readable(echo);
        assert_eq!(
            conn.on_writable(),
            Next::Close(CloseReason::SendFailed(io::ErrorKind::BrokenPipe))
        );
    }

    #[test]
    fn test_oversized_response_is_truncated() {
        let mut stream = MockStream::default();
        stream.reads.push_back(Ok(b"go".to_vec()));
        let mut conn = Connection::new(stream, 8);

        conn.on_readable(|_| vec![b'a'; 20]);
        assert_eq!(conn.buffer().len(), 8);
        assert_eq!(conn.buffer().capacity(), 8);
    }

    /// Readiness for the other phase does not disturb the current buffer.
    #[test]
    fn test_mismatched_readiness_is_ignored() {
        let mut conn = Connection::new(MockStream::default(), 16);
        assert_eq!(conn.on_writable(), Next::Read);
        assert_eq!(conn.phase(), Phase::Reading);
    }
}
