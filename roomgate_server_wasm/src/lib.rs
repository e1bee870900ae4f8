//! Room directory and join rendezvous for relay-hosted game rooms
//!
//! This crate serves the entry API that game-engine clients use before they
//! connect to a room's relay. It runs as a WASI HTTP component and speaks a
//! small packed little-endian binary protocol (see [`codec`]).
//!
//! # Protocol
//!
//! - **GET /version** - Minimum client SDK version, chosen by `User-Agent`
//! - **POST /logon**, **POST /logoff** - Session acknowledgements
//! - **GET /rooms** - Summaries of every named room
//! - **POST /room/create/{name}** - Bind a name to a free room (body: `maxPlayers:u16`)
//! - **PUT /room/join_prepare_polling/{name}** - Poll for admission (body: join seed)
//! - **POST /room/join_prepare_complete/{name}** - Release the join slot (body: join seed)
//! - **GET /room/prop/{name}?key={key}** - Read a room property
//!
//! ## Joining a room
//!
//! Each room admits one joiner at a time. A client polls with its seed until
//! it is either prepared (it receives its participant id, the master id and
//! the current members), told the room is full, or told its earlier
//! admission timed out. It then connects to the relay and calls complete,
//! which lets the next queued seed through.
//!
//! ```text
//! client                          entry
//!   | PUT join_prepare_polling(seed) |
//!   | <------------- 202 ----------- |   slot busy, queued
//!   | PUT join_prepare_polling(seed) |
//!   | <--- 200 JoinPrepareResponse - |   slot taken
//!   | POST join_prepare_complete     |
//!   | <------------- 200 ----------- |   slot released
//! ```
//!
//! # Example
//!
//! ```bash
//! # Start the server
//! wasmtime serve -S common -S cli --addr 127.0.0.1:7777 roomgate-entry-wasm.wasm
//!
//! # Required SDK version
//! curl -A NativeCdk http://127.0.0.1:7777/version
//!
//! # Create a four player room called lobby
//! printf '\x04\x00' | curl --data-binary @- http://127.0.0.1:7777/room/create/lobby | xxd
//! ```

#![forbid(unsafe_code)]

pub mod clock;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod handler;
pub mod relay;
pub mod rendezvous;
pub mod room;
pub mod state;

pub use config::EntryConfig;
pub use error::{CodecError, ConfigError, DirectoryError, EntryError};
pub use handler::{Reply, handle_request, route};
pub use state::ServerState;
