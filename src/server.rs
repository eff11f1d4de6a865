use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::acceptor::{self, Acceptor};
use crate::codec::{Decode, Encode};
use crate::config::ServerConfig;
use crate::error::{CodecError, ExecutorResult, Result, ServerError};
use crate::executor::Executor;
use crate::http::{HttpRequest, HttpResponse, Method, StatusCode};
use crate::reactor::{Pipeline, Reactor};
use crate::router::Router;

/// An HTTP server: one acceptor thread plus a fixed pool of worker reactors.
///
/// Routes are registered before [`start`](Server::start). Each start takes a
/// snapshot of the route table, so registrations made while running only
/// apply after the next restart.
///
/// ```no_run
/// use ferrule::{HttpMessage, HttpResponse, Method, Server, StatusCode};
///
/// # fn main() -> ferrule::Result<()> {
/// let mut server = Server::bind("127.0.0.1", 8080);
/// server.register("/", Method::Get, |_req| {
///     let mut response = HttpResponse::new(StatusCode::Ok);
///     response.set_header("Content-Type", "text/plain");
///     response.set_content("test\n");
///     response
/// });
/// server.start()?;
/// // ...
/// server.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: ServerConfig,
    router: Router,
    running: Arc<AtomicBool>,
    executor: Executor,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Server {
            config,
            router: Router::new(),
            running: Arc::new(AtomicBool::new(false)),
            executor: Executor::new(),
            local_addr: None,
        }
    }

    /// A server with default settings listening on `host:port`.
    pub fn bind(host: impl Into<String>, port: u16) -> Self {
        Server::new(ServerConfig::with_address(host, port))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The address actually bound while running. Differs from
    /// [`port`](Server::port) when the configured port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Registers a handler. See [`Router::register`].
    pub fn register<F>(&mut self, path: &str, method: Method, handler: F) -> &mut Self
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        if self.is_running() {
            log::warn!("route {} {} registered while running, applies after restart", method, path);
        }
        self.router.register(path, method, handler);
        self
    }

    /// Binds the listening socket and launches the acceptor and every worker.
    ///
    /// # Errors
    /// Any setup failure (invalid configuration, socket creation, bind,
    /// listen, readiness context, thread spawn) is returned and the server
    /// does not start.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() || !self.executor.is_empty() {
            return Err(ServerError::AlreadyRunning);
        }
        self.config.validate()?;

        let listener = acceptor::bind(&self.config)?;
        let local_addr = listener.local_addr().map_err(ServerError::Socket)?;

        let router = Arc::new(self.router.clone());
        let pipeline: Pipeline = Arc::new(move |raw: &[u8]| respond(&router, raw).to_bytes());

        let mut reactors = Vec::with_capacity(self.config.workers);
        let mut handles = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let (reactor, handle) =
                Reactor::new(id, &self.config, pipeline.clone(), self.running.clone())?;
            reactors.push(reactor);
            handles.push(handle);
        }
        let acceptor = Acceptor::new(listener, handles, &self.config, self.running.clone());

        self.running.store(true, Ordering::Release);
        if let Err(err) = self.launch(reactors, acceptor) {
            self.running.store(false, Ordering::Release);
            let _ = self.executor.join();
            return Err(err.into());
        }

        self.local_addr = Some(local_addr);
        log::info!(
            "listening on {} with {} workers",
            local_addr,
            self.config.workers
        );
        Ok(())
    }

    fn launch(&mut self, reactors: Vec<Reactor>, acceptor: Acceptor) -> ExecutorResult<()> {
        for reactor in reactors {
            let name = format!("ferrule-worker-{}", reactor.id());
            self.executor.spawn(name, move || reactor.run())?;
        }
        self.executor
            .spawn("ferrule-acceptor".to_owned(), move || acceptor.run())
    }

    /// Clears the running flag and waits for every loop to exit.
    ///
    /// Connections still open are closed without draining. Stopping a server
    /// that is not running does nothing.
    ///
    /// # Errors
    /// Returns an error if one of the loop threads panicked.
    pub fn stop(&mut self) -> Result<()> {
        if self.executor.is_empty() {
            return Ok(());
        }

        self.running.store(false, Ordering::Release);
        let joined = self.executor.join();
        self.local_addr = None;
        log::info!("server on {}:{} stopped", self.config.host, self.config.port);

        joined.map_err(ServerError::from)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("error while stopping server: {}", err);
        }
    }
}

/// Produces the response for the bytes of one receive.
///
/// Decode failures become `400` or `505`, a panicking handler becomes `500`;
/// in each case the reason is the response body.
pub(crate) fn respond(router: &Router, raw: &[u8]) -> HttpResponse {
    let request = match HttpRequest::decode(raw) {
        Ok(request) => request,
        Err(CodecError::Malformed(reason)) => {
            return HttpResponse::with_content(StatusCode::BadRequest, reason)
        }
        Err(CodecError::UnsupportedVersion(reason)) => {
            return HttpResponse::with_content(StatusCode::HttpVersionNotSupported, reason)
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| router.dispatch(&request))) {
        Ok(response) => response,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            log::error!(
                "handler for {} {} failed: {}",
                request.method(),
                request.uri(),
                reason
            );
            HttpResponse::with_content(StatusCode::InternalServerError, reason)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "request handler failed".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMessage;

    fn router() -> Router {
        let mut router = Router::new();
        router.register("/", Method::Get, |_| {
            HttpResponse::with_content(StatusCode::Ok, "test\n")
        });
        router.register("/panic", Method::Get, |_| panic!("handler exploded"));
        router
    }

    fn loopback() -> ServerConfig {
        let mut config = ServerConfig::with_address("127.0.0.1", 0);
        config.workers = 2;
        config
    }

    #[test]
    fn test_respond_routes_request() {
        let response = respond(&router(), b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.content(), b"test\n");
    }

    #[test]
    fn test_respond_malformed_is_bad_request() {
        let response = respond(&router(), b"FOOBAR / HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::BadRequest);
        assert_eq!(response.content(), b"Unknown HTTP method: FOOBAR");
        assert_eq!(response.header("Content-Length"), Some("27"));

        let response = respond(&router(), b"no line terminator");
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[test]
    fn test_respond_unsupported_version() {
        let response = respond(&router(), b"GET / HTTP/1.0\r\n\r\n");
        assert_eq!(response.status(), StatusCode::HttpVersionNotSupported);
    }

    #[test]
    fn test_respond_handler_panic_is_internal_error() {
        let response = respond(&router(), b"GET /panic HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert_eq!(response.content(), b"handler exploded");
    }

    #[test]
    fn test_start_and_stop() {
        let mut server = Server::new(loopback());
        assert!(!server.is_running());

        server.start().unwrap();
        assert!(server.is_running());
        assert!(server.local_addr().is_some());
        assert!(matches!(server.start(), Err(ServerError::AlreadyRunning)));

        server.stop().unwrap();
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
        server.stop().unwrap();
    }

    #[test]
    fn test_invalid_config_never_runs() {
        let mut config = loopback();
        config.workers = 0;
        let mut server = Server::new(config);

        assert!(matches!(server.start(), Err(ServerError::InvalidConfig(_))));
        assert!(!server.is_running());
    }

    #[test]
    fn test_accessors() {
        let mut server = Server::bind("127.0.0.1", 9090);
        server
            .register("/a", Method::Get, |_| HttpResponse::new(StatusCode::Ok))
            .register("/a", Method::Head, |_| HttpResponse::new(StatusCode::Ok));

        assert_eq!(server.host(), "127.0.0.1");
        assert_eq!(server.port(), 9090);
        assert_eq!(server.router().len(), 2);
        assert_eq!(server.config().port, 9090);
    }
}
