//! Serves a plain-text greeting on `/` until interrupted.
//!
//! Settings come from `FERRULE_*` environment variables, e.g.
//! `FERRULE_PORT=3000 cargo run --example hello`.

use ferrule::{HttpMessage, HttpRequest, HttpResponse, Method, Server, ServerConfig, StatusCode};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

fn hello(_req: &HttpRequest) -> HttpResponse {
    let mut response = HttpResponse::new(StatusCode::Ok);
    response.set_header("Content-Type", "text/plain");
    response.set_content("test\n");
    response
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut server = Server::new(ServerConfig::new()?);
    server
        .register("/", Method::Get, hello)
        .register("/", Method::Head, hello);

    server.start()?;
    if let Some(addr) = server.local_addr() {
        log::info!("try: curl -i http://{}/", addr);
    }

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    if let Some(signal) = signals.forever().next() {
        log::info!("received signal {}, shutting down", signal);
    }

    server.stop()?;
    Ok(())
}
