#![allow(clippy::return_self_not_must_use)]
#![doc = include_str!("../README.md")]

//! ## Architecture
//! The server is built on several key components:
//!
//! - `Server`: entry point that owns the configuration and route table and
//!   runs the `start`/`stop` lifecycle
//! - `Acceptor`: accept loop distributing connections round-robin
//! - `Reactor`: per-worker mio event loop driving connection state machines
//! - `Executor`: the dedicated threads those loops run on
//! - `Router`: `(path, method)` dispatch to user handlers
//! - `Encode`/`Decode`: the HTTP/1.1 wire codec

pub use crate::codec::{Decode, Encode};
pub use crate::config::ServerConfig;
pub use crate::error::{CodecError, ExecutorError, ReactorError, Result, ServerError};
pub use crate::http::{HttpMessage, HttpRequest, HttpResponse, Message, Method, StatusCode, Version};
pub use crate::router::{Handler, Router};
pub use crate::server::Server;
pub use crate::uri::Uri;

mod acceptor;
mod backoff;
mod codec;
mod config;
mod connection;
mod error;
mod executor;
mod http;
mod reactor;
mod router;
mod server;
mod slots;
mod uri;
