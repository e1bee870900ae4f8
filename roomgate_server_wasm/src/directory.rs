//! Room pool and name directory
//!
//! All rooms are created up front. A create request binds a caller-chosen
//! name to the next unbound room, in provisioning order; names are never
//! released.
//!
//! Locking: the pool (free list and name maps) sits behind one lock, and
//! every room behind its own. The pool lock may be held while taking a room
//! lock (allocation initialises the room it binds), never the reverse, so
//! requests for different rooms only meet briefly on the pool lock.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::{Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::codec::MAX_TEXT_LEN;
use crate::config::EntryConfig;
use crate::error::DirectoryError;
use crate::room::{Room, RoomDescriptor, RoomSnapshot};

/// Unbound rooms and the name bindings made so far
#[derive(Debug, Default)]
pub struct RoomPool {
    available: VecDeque<Uuid>,
    reservations: BTreeMap<String, Uuid>,
    reverse: HashMap<Uuid, String>,
}

impl RoomPool {
    pub fn available_len(&self) -> usize {
        self.available.len()
    }
}

/// Result of binding a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub id: Uuid,
    /// `false` when the name was already bound and nothing was consumed
    pub created: bool,
}

#[derive(Debug)]
pub struct Directory {
    pool: Mutex<RoomPool>,
    rooms: HashMap<Uuid, Mutex<Room>>,
}

impl Directory {
    /// Build the room pool described by `config`, each room with a fresh id.
    pub fn provision(config: &EntryConfig) -> Self {
        let descriptors = (0..config.room_pool_size)
            .map_while(|index| config.room_ports(index))
            .map(|ports| {
                let mut descriptor =
                    RoomDescriptor::new(Uuid::new_v4(), ports, config.listen.clone());
                descriptor.capacity = config.room_capacity;
                descriptor.queuing_policy = config.queuing_policy;
                descriptor
            });
        let directory = Self::from_descriptors(descriptors);
        let provisioned = directory.rooms.len();
        if provisioned < config.room_pool_size {
            warn!(
                provisioned,
                requested = config.room_pool_size,
                port_base = config.room_port_base,
                "port range too small, room pool truncated"
            );
        } else {
            info!(rooms = provisioned, "room pool provisioned");
        }
        directory
    }

    /// Build a pool from explicit descriptors; they are handed out in order.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = RoomDescriptor>) -> Self {
        let mut pool = RoomPool::default();
        let mut rooms = HashMap::new();
        for descriptor in descriptors {
            pool.available.push_back(descriptor.id);
            rooms.insert(descriptor.id, Mutex::new(Room::new(descriptor)));
        }
        Self {
            pool: Mutex::new(pool),
            rooms,
        }
    }

    /// Bind `name` to the next free room, or report the room already bound
    /// to it.
    pub fn allocate(&self, name: &str, capacity: u16) -> Result<Allocation, DirectoryError> {
        if name.is_empty() || name.len() > MAX_TEXT_LEN {
            return Err(DirectoryError::InvalidRoomName(name.len()));
        }

        let mut pool = self.pool.lock();
        if let Some(id) = pool.reservations.get(name) {
            return Ok(Allocation {
                id: *id,
                created: false,
            });
        }

        let id = pool
            .available
            .pop_front()
            .ok_or(DirectoryError::PoolExhausted)?;
        pool.reservations.insert(name.to_string(), id);
        pool.reverse.insert(id, name.to_string());

        if let Some(room) = self.rooms.get(&id) {
            let mut room = room.lock();
            room.descriptor.name = name.to_string();
            room.descriptor.filter = String::new();
            room.descriptor.capacity = capacity;
        }
        info!(%id, name, capacity, remaining = pool.available.len(), "room allocated");

        Ok(Allocation { id, created: true })
    }

    pub fn resolve(&self, name: &str) -> Result<Uuid, DirectoryError> {
        self.pool
            .lock()
            .reservations
            .get(name)
            .copied()
            .ok_or_else(|| DirectoryError::RoomNotFound(name.to_string()))
    }

    /// Name bound to `id`, if any.
    pub fn name_of(&self, id: Uuid) -> Option<String> {
        self.pool.lock().reverse.get(&id).cloned()
    }

    /// Ids of all named rooms, ordered by name.
    pub fn reserved_rooms(&self) -> Vec<Uuid> {
        self.pool.lock().reservations.values().copied().collect()
    }

    pub fn available_len(&self) -> usize {
        self.pool.lock().available_len()
    }

    pub fn room(&self, id: Uuid) -> Option<&Mutex<Room>> {
        self.rooms.get(&id)
    }

    /// Copy the summary inputs of room `id`; the room lock is released on
    /// return.
    pub fn snapshot(&self, id: Uuid) -> Option<RoomSnapshot> {
        self.rooms.get(&id).map(|room| room.lock().snapshot())
    }

    /// Lock the room bound to `name`. The pool lock is released first.
    pub fn lock_room(&self, name: &str) -> Result<MutexGuard<'_, Room>, DirectoryError> {
        let id = self.resolve(name)?;
        self.rooms
            .get(&id)
            .map(|room| room.lock())
            .ok_or_else(|| DirectoryError::RoomNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(rooms: usize) -> Directory {
        Directory::provision(&EntryConfig {
            room_pool_size: rooms,
            ..EntryConfig::default()
        })
    }

    #[test]
    fn provisions_rooms_with_port_layout() {
        let directory = directory(3);
        assert_eq!(directory.available_len(), 3);

        let first = directory.allocate("a", 4).unwrap();
        let second = directory.allocate("b", 4).unwrap();
        let ports = |id| directory.room(id).unwrap().lock().descriptor.ports;
        assert_eq!(ports(first.id).stateful_deal, 7000);
        assert_eq!(ports(second.id).stateful_deal, 7004);
    }

    #[test]
    fn provisioning_stops_at_the_last_port() {
        let directory = Directory::provision(&EntryConfig {
            room_port_base: 65530,
            room_pool_size: 3,
            ..EntryConfig::default()
        });
        assert_eq!(directory.available_len(), 1);
    }

    #[test]
    fn allocation_is_idempotent_per_name() {
        let directory = directory(2);

        let created = directory.allocate("lobby", 4).unwrap();
        assert!(created.created);
        assert_eq!(directory.available_len(), 1);

        let again = directory.allocate("lobby", 16).unwrap();
        assert_eq!(again, Allocation { id: created.id, created: false });
        assert_eq!(directory.available_len(), 1);

        let room = directory.lock_room("lobby").unwrap();
        assert_eq!(room.descriptor.capacity, 4, "second request does not resize");
        assert_eq!(room.descriptor.name, "lobby");
    }

    #[test]
    fn pool_exhaustion() {
        let directory = directory(1);
        directory.allocate("one", 2).unwrap();
        assert_eq!(directory.allocate("two", 2), Err(DirectoryError::PoolExhausted));
        // Existing names still resolve once the pool is empty.
        assert!(!directory.allocate("one", 2).unwrap().created);
    }

    #[test]
    fn names_must_fit_the_wire() {
        let directory = directory(1);
        assert_eq!(directory.allocate("", 2), Err(DirectoryError::InvalidRoomName(0)));
        assert_eq!(
            directory.allocate(&"x".repeat(256), 2),
            Err(DirectoryError::InvalidRoomName(256))
        );
        assert!(directory.allocate(&"x".repeat(255), 2).unwrap().created);
    }

    #[test]
    fn snapshot_releases_room_lock() {
        let directory = directory(1);
        let id = directory.allocate("lobby", 4).unwrap().id;

        let snapshot = directory.snapshot(id).unwrap();
        assert_eq!(snapshot.descriptor.name, "lobby");
        assert_eq!(snapshot.user_count, 0);
        assert!(directory.room(id).unwrap().try_lock().is_some());
        assert!(directory.snapshot(Uuid::new_v4()).is_none());
    }

    #[test]
    fn resolve_and_list() {
        let directory = directory(4);
        assert_eq!(
            directory.resolve("nowhere"),
            Err(DirectoryError::RoomNotFound("nowhere".into()))
        );
        assert!(directory.reserved_rooms().is_empty());

        let b = directory.allocate("b", 2).unwrap().id;
        let a = directory.allocate("a", 2).unwrap().id;
        assert_eq!(directory.resolve("a"), Ok(a));
        assert_eq!(directory.name_of(b).as_deref(), Some("b"));
        assert_eq!(directory.reserved_rooms(), vec![a, b]);
    }
}
