//! Error types for the room directory and join rendezvous
//!
//! Expected protocol outcomes (room full, keep polling, timeout, seed
//! mismatch, name already taken) are not errors; they live in the outcome
//! enums of [`crate::rendezvous`] and [`crate::directory`].

use thiserror::Error;

/// Errors raised while encoding or decoding wire structures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before a complete structure was read
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A variable-length field does not fit its length prefix
    #[error("{field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A listen address could not be turned into an IP address
    #[error("unresolved listen address: {0}")]
    UnresolvedAddress(String),

    /// A name in a join response is not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

/// Errors from the room pool and name directory
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// No room is reserved under this name
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Every pre-provisioned room is already bound to a name
    #[error("room pool exhausted")]
    PoolExhausted,

    /// The requested room name cannot be represented on the wire
    #[error("invalid room name ({0} bytes)")]
    InvalidRoomName(usize),
}

/// Errors surfaced to the HTTP layer from a single request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors found while validating configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("room pool size must be at least 1")]
    EmptyPool,

    #[error("port layout overflows: base {base} with {rooms} rooms")]
    PortOverflow { base: u16, rooms: usize },

    #[error("join timeout must be positive, got {0}")]
    JoinTimeout(i64),

    #[error("invalid listen address {0}")]
    ListenAddress(String),
}
