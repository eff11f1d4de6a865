//! Worker event loop built on mio.
//!
//! Each worker owns one `mio::Poll`, its own event batch and a slot table of
//! connections. Nothing in here is shared with other workers: accepted
//! streams arrive over a channel and are registered by the worker itself,
//! and the poll token of a connection is its slot index.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};

use crate::backoff::Backoff;
use crate::config::ServerConfig;
use crate::connection::{CloseReason, Connection, Next, Phase};
use crate::error::{ReactorError, ReactorResult};
use crate::slots::Slots;

/// Turns the bytes of one receive into the bytes of the response.
pub(crate) type Pipeline = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// The parts of a mio event the state machine cares about.
#[derive(Debug, Clone, Copy)]
struct Readiness {
    token: Token,
    readable: bool,
    writable: bool,
    hang_up: bool,
}

impl Readiness {
    fn from_event(event: &mio::event::Event) -> Self {
        Readiness {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            hang_up: event.is_error() || (event.is_read_closed() && event.is_write_closed()),
        }
    }
}

/// Sending side of a worker's inbox, held by the acceptor.
#[derive(Debug, Clone)]
pub(crate) struct ReactorHandle {
    id: usize,
    sender: Sender<TcpStream>,
}

impl ReactorHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Hands `stream` over to the worker.
    ///
    /// The stream is given back if the worker has already exited.
    pub fn assign(&self, stream: TcpStream) -> Result<(), TcpStream> {
        self.sender.send(stream).map_err(|err| err.0)
    }
}

/// A handle/inbox pair not yet tied to a reactor.
pub(crate) fn inbox(id: usize) -> (ReactorHandle, Receiver<TcpStream>) {
    let (sender, receiver) = mpsc::channel();
    (ReactorHandle { id, sender }, receiver)
}

pub(crate) struct Reactor {
    id: usize,
    poll: Poll,
    events: Events,
    ready: Vec<Readiness>,
    connections: Slots<Connection<TcpStream>>,
    inbox: Receiver<TcpStream>,
    pipeline: Pipeline,
    buffer_size: usize,
    backoff: Backoff,
    running: Arc<AtomicBool>,
}

impl Reactor {
    /// Creates a worker and the handle used to feed it connections.
    ///
    /// # Errors
    /// Returns `ReactorError::Init` if the readiness context cannot be created.
    pub fn new(
        id: usize,
        config: &ServerConfig,
        pipeline: Pipeline,
        running: Arc<AtomicBool>,
    ) -> ReactorResult<(Self, ReactorHandle)> {
        let poll = Poll::new().map_err(ReactorError::Init)?;
        let (handle, inbox) = inbox(id);

        let reactor = Reactor {
            id,
            poll,
            events: Events::with_capacity(config.max_events),
            ready: Vec::with_capacity(config.max_events),
            connections: Slots::with_capacity(config.connections_per_worker()),
            inbox,
            pipeline,
            buffer_size: config.max_buffer_size,
            backoff: Backoff::new(config.backoff_range()),
            running,
        };
        Ok((reactor, handle))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Runs until the shared running flag is cleared, then closes every
    /// connection this worker still owns.
    pub fn run(mut self) {
        log::debug!("worker {} started", self.id);

        let mut active = true;
        while self.running.load(Ordering::Acquire) {
            if !active {
                self.backoff.pause();
            }
            active = self.turn();
        }

        self.shutdown();
    }

    /// One loop iteration: adopt new connections, poll without blocking and
    /// drive every ready connection one step. Returns whether there was work.
    fn turn(&mut self) -> bool {
        let adopted = self.adopt_pending();

        if let Err(err) = self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            if err.kind() != io::ErrorKind::Interrupted {
                log::warn!("worker {}: {}", self.id, ReactorError::Polling(err));
            }
            return adopted > 0;
        }

        if self.events.is_empty() {
            return adopted > 0;
        }

        // Snapshot first: driving a connection needs `&mut self`.
        let mut ready = std::mem::take(&mut self.ready);
        ready.extend(self.events.iter().map(Readiness::from_event));
        for readiness in ready.drain(..) {
            self.drive(readiness);
        }
        self.ready = ready;

        true
    }

    fn adopt_pending(&mut self) -> usize {
        let mut adopted = 0;
        while let Ok(stream) = self.inbox.try_recv() {
            self.attach(stream);
            adopted += 1;
        }
        adopted
    }

    /// Registers a new connection for read readiness.
    fn attach(&mut self, mut stream: TcpStream) {
        let Some(index) = self.connections.vacant() else {
            log::warn!(
                "worker {}: connection table full, dropping {:?}",
                self.id,
                stream.peer_addr()
            );
            return;
        };

        let registered = self
            .poll
            .registry()
            .register(&mut stream, Token(index), Interest::READABLE);
        if let Err(err) = registered {
            log::warn!("worker {}: {}", self.id, ReactorError::Registration(err));
            return;
        }

        let inserted = self
            .connections
            .insert(Connection::new(stream, self.buffer_size));
        debug_assert_eq!(inserted.ok(), Some(index));
    }

    fn drive(&mut self, readiness: Readiness) {
        let index = readiness.token.0;

        // Hang-up and error conditions win over any read or write readiness.
        if readiness.hang_up {
            self.close(index, CloseReason::HangUp);
            return;
        }

        let Some(connection) = self.connections.get_mut(index) else {
            return;
        };

        let pipeline = &self.pipeline;
        let next = match connection.phase() {
            Phase::Reading if readiness.readable => connection.on_readable(|raw| pipeline(raw)),
            Phase::Writing if readiness.writable => connection.on_writable(),
            _ => return,
        };

        let interest = match next {
            Next::Read => Interest::READABLE,
            Next::Write => Interest::WRITABLE,
            Next::Close(reason) => {
                self.close(index, reason);
                return;
            }
        };

        let rearmed = self
            .poll
            .registry()
            .reregister(connection.stream_mut(), readiness.token, interest);
        if let Err(err) = rearmed {
            log::warn!("worker {}: {}", self.id, ReactorError::Registration(err));
            self.close(index, CloseReason::SendFailed(io::ErrorKind::Other));
        }
    }

    /// Deregisters and drops the connection, closing its socket.
    fn close(&mut self, index: usize, reason: CloseReason) {
        let Some(mut connection) = self.connections.remove(index) else {
            return;
        };

        match reason {
            CloseReason::PeerClosed | CloseReason::HangUp => {
                log::debug!("worker {}: connection {} closed ({:?})", self.id, index, reason)
            }
            CloseReason::ReceiveFailed(_) | CloseReason::SendFailed(_) => {
                log::warn!("worker {}: connection {} dropped ({:?})", self.id, index, reason)
            }
        }

        if let Err(err) = self.poll.registry().deregister(connection.stream_mut()) {
            log::debug!("worker {}: deregister failed: {}", self.id, err);
        }
    }

    fn shutdown(&mut self) {
        let registry = self.poll.registry();
        let closed = self.connections.len();
        for mut connection in self.connections.drain() {
            if let Err(err) = registry.deregister(connection.stream_mut()) {
                log::debug!("worker {}: deregister failed: {}", self.id, err);
            }
        }
        log::debug!("worker {} stopped, closed {} connections", self.id, closed);
    }
}
