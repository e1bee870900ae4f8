//! Server state shared by all request handlers
//!
//! [`ServerState`] is a cheap handle around the room directory, the
//! configuration and the clock. Each operation takes only the locks it needs
//! (see [`crate::directory`]) and returns either a protocol outcome or an
//! encoded response body; turning those into HTTP responses is the
//! handler's job.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec::{ResponseCode, encode_create_response, encode_property, encode_room_list};
use crate::config::EntryConfig;
use crate::directory::{Allocation, Directory};
use crate::error::{CodecError, DirectoryError, EntryError};
use crate::rendezvous::{self, CompleteOutcome, PollOutcome};
use crate::room::RoomSnapshot;

struct Inner {
    config: EntryConfig,
    directory: Directory,
    clock: Arc<dyn Clock>,
}

/// Handle to the process-wide entry state
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<Inner>,
}

impl ServerState {
    /// Provision the room pool from `config` and use the system clock.
    pub fn new(config: EntryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EntryConfig, clock: Arc<dyn Clock>) -> Self {
        let directory = Directory::provision(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                directory,
                clock,
            }),
        }
    }

    pub fn config(&self) -> &EntryConfig {
        &self.inner.config
    }

    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    /// Encoded body of the list exchange, covering every named room.
    pub fn list_rooms(&self) -> Result<Bytes, CodecError> {
        let directory = self.directory();
        let snapshots = directory
            .reserved_rooms()
            .into_iter()
            .filter_map(|id| directory.snapshot(id))
            .collect::<Vec<_>>();
        let summaries = snapshots
            .iter()
            .map(RoomSnapshot::summary)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(rooms = summaries.len(), "listing rooms");
        encode_room_list(&summaries)
    }

    /// Bind `name` to a room and encode the create response.
    ///
    /// An existing name answers with `NG_CREATE_ROOM_ALREADY_EXISTS` and the
    /// existing room; `max_players` is then ignored.
    pub fn create_room(&self, name: &str, max_players: u16) -> Result<(Allocation, Bytes), EntryError> {
        let directory = self.directory();
        let allocation = directory.allocate(name, max_players)?;
        let code = if allocation.created {
            ResponseCode::OkRoomAssignAndCreated
        } else {
            info!(name, id = %allocation.id, "room already exists");
            ResponseCode::NgCreateRoomAlreadyExists
        };

        let summary = directory
            .snapshot(allocation.id)
            .ok_or_else(|| DirectoryError::RoomNotFound(name.to_string()))?
            .summary()?;
        Ok((allocation, encode_create_response(code, &summary)?))
    }

    pub fn join_prepare_polling(&self, name: &str, seed: &[u8]) -> Result<PollOutcome, EntryError> {
        let mut room = self.directory().lock_room(name)?;
        let now = self.inner.clock.now_unix();
        let outcome = rendezvous::poll(&mut room, seed, now, self.config().join_timeout_secs);
        if let Err(e) = &outcome {
            warn!(name, seed = %hex::encode(seed), "join prepare response failed: {e}");
        }
        Ok(outcome?)
    }

    pub fn join_prepare_complete(&self, name: &str, seed: &[u8]) -> Result<CompleteOutcome, EntryError> {
        let mut room = self.directory().lock_room(name)?;
        Ok(rendezvous::complete(&mut room, seed))
    }

    /// Encoded body of the property exchange for `key`.
    pub fn room_property(&self, name: &str, key: &str) -> Result<Bytes, EntryError> {
        let room = self.directory().lock_room(name)?;
        Ok(encode_property(room.properties.get(key))?)
    }
}
