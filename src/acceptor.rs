use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::net::{TcpListener, TcpStream};
use socket2::{Domain, Protocol, Socket, Type};

use crate::backoff::Backoff;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::reactor::ReactorHandle;

/// Creates the non-blocking listening socket described by `config`.
///
/// Address and port reuse are enabled and the backlog is bounded by
/// `config.backlog`.
///
/// # Errors
/// Any failure here is a setup failure of the server.
pub(crate) fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let addr = resolve(&config.host, config.port)?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(ServerError::Socket)?;
    socket.set_reuse_address(true).map_err(ServerError::Socket)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(ServerError::Socket)?;
    socket.set_nonblocking(true).map_err(ServerError::Socket)?;

    socket
        .bind(&addr.into())
        .map_err(|source| ServerError::Bind { addr, source })?;

    let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
    socket.listen(backlog).map_err(ServerError::Listen)?;

    Ok(TcpListener::from_std(std::net::TcpListener::from(socket)))
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let unresolved = || ServerError::Address(format!("{}:{}", host, port));
    (host, port)
        .to_socket_addrs()
        .map_err(|_| unresolved())?
        .next()
        .ok_or_else(unresolved)
}

/// Accept loop that spreads new connections over the workers round-robin.
pub(crate) struct Acceptor {
    listener: TcpListener,
    workers: Vec<ReactorHandle>,
    next: usize,
    backoff: Backoff,
    running: Arc<AtomicBool>,
    last_error: Option<io::ErrorKind>,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        workers: Vec<ReactorHandle>,
        config: &ServerConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Acceptor {
            listener,
            workers,
            next: 0,
            backoff: Backoff::new(config.backoff_range()),
            running,
            last_error: None,
        }
    }

    pub fn run(mut self) {
        log::debug!("acceptor started for {} workers", self.workers.len());

        let mut active = true;
        while self.running.load(Ordering::Acquire) {
            if !active {
                self.backoff.pause();
            }
            active = self.accept_one();
        }

        log::debug!("acceptor stopped");
    }

    /// Attempts one non-blocking accept. Returns whether a connection was taken.
    fn accept_one(&mut self) -> bool {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("accepted connection from {}", peer);
                self.last_error = None;
                if let Err(err) = stream.set_nodelay(true) {
                    log::debug!("set_nodelay failed for {}: {}", peer, err);
                }
                self.assign(stream);
                true
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => false,
            Err(err) => {
                self.report(&err);
                false
            }
        }
    }

    /// Logs an accept failure. A failure repeating the previous one (e.g. a
    /// persistent EMFILE) is only logged at debug level until an accept
    /// succeeds or the error changes. Returns whether it was a warning.
    fn report(&mut self, err: &io::Error) -> bool {
        if self.last_error == Some(err.kind()) {
            log::debug!("accept failed again: {}", err);
            return false;
        }
        self.last_error = Some(err.kind());
        log::warn!("accept failed: {}", err);
        true
    }

    fn assign(&mut self, stream: TcpStream) {
        let Some(worker) = self.workers.get(self.next) else {
            log::warn!("no worker available, dropping connection");
            return;
        };

        if let Err(stream) = worker.assign(stream) {
            log::warn!(
                "worker {} has exited, dropping connection from {:?}",
                worker.id(),
                stream.peer_addr()
            );
        }
        self.next = (self.next + 1) % self.workers.len();
    }
}
