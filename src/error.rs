use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors produced while decoding a request off the wire.
///
/// The two kinds map to different responses: a malformed request is answered
/// with `400 Bad Request`, an unsupported version with
/// `505 HTTP Version Not Supported`. The message becomes the response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Missing start line, bad tokenization, or an unknown method or version token
    #[error("{0}")]
    Malformed(String),

    /// A recognised version other than the one the server speaks
    #[error("{0}")]
    UnsupportedVersion(String),
}

/// Represents errors that can occur in the reactor system responsible for I/O events.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// Error during reactor initialization
    #[error("reactor initialization failed: {0}")]
    Init(io::Error),

    /// Error when registering resources with the reactor
    #[error("registration failed: {0}")]
    Registration(io::Error),

    /// Error during event polling operations
    #[error("polling failed: {0}")]
    Polling(io::Error),
}

/// Errors raised while managing the threads that host the event loops.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Error when spawning a new thread fails
    #[error("thread spawn failed: {0}")]
    ThreadSpawn(io::Error),

    /// A loop thread panicked before it could be joined
    #[error("thread {0} panicked")]
    Panicked(String),
}

/// Setup failures reported by [`Server::start`](crate::Server::start).
///
/// None of these leave the server running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured host/port did not resolve to a socket address
    #[error("cannot resolve listen address {0}")]
    Address(String),

    #[error("socket setup failed: {0}")]
    Socket(io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen: {0}")]
    Listen(io::Error),

    #[error(transparent)]
    Reactor(#[from] ReactorError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Type alias for Results using CodecError as the error type
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Type alias for Results using ReactorError as the error type
pub type ReactorResult<T> = std::result::Result<T, ReactorError>;

/// Type alias for Results using ExecutorError as the error type
pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;

/// Type alias for Results using ServerError as the error type
pub type Result<T> = std::result::Result<T, ServerError>;
