//! WASI HTTP server entry point for the room entry service
//!
//! Run it with `wasmtime serve`; configuration is read from `ROOMGATE_*`
//! environment variables on the first request.

use std::cell::RefCell;

use roomgate_server_wasm::{EntryConfig, ServerState, handle_request};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wstd::http::{Body, Request, Response};

// Thread-local state for the server (WASI is single-threaded)
thread_local! {
    static STATE: RefCell<Option<ServerState>> = const { RefCell::new(None) };
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init only fails because a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn get_or_init_state() -> ServerState {
    STATE.with(|s| {
        s.borrow_mut()
            .get_or_insert_with(|| {
                init_tracing();
                let mut config = EntryConfig::from_env();
                if let Err(e) = config.validate() {
                    warn!("invalid configuration, using defaults: {e}");
                    config = EntryConfig::default();
                }
                info!(
                    rooms = config.room_pool_size,
                    port_base = config.room_port_base,
                    join_timeout_secs = config.join_timeout_secs,
                    "entry service starting"
                );
                ServerState::new(config)
            })
            .clone()
    })
}

/// The main HTTP handler for WASI
#[wstd::http_server]
async fn main(request: Request<Body>) -> Result<Response<Body>, wstd::http::Error> {
    let state = get_or_init_state();
    handle_request(request, &state).await
}
