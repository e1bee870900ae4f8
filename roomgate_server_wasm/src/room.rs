//! Per-room parameters and state
//!
//! A [`Room`] bundles everything that belongs to one pre-provisioned room:
//! its static [`RoomDescriptor`], the live [`RelayInstance`], the
//! [`JoinSlot`] of the handshake, and an opaque property store. The
//! directory keeps each `Room` behind its own lock.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use uuid::Uuid;

use crate::codec::{ROOM_FLAGS, RoomSummary};
use crate::error::CodecError;
use crate::relay::RelayInstance;
use crate::rendezvous::JoinSlot;

/// Property key served when a client does not name one
pub const LEGACY_PROPERTY_KEY: &str = "legacy";

/// When a room stops admitting new joiners
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum QueuingPolicy {
    /// Full once admitted members reach capacity
    BlockAtRoomMax,
    /// Full once members plus in-flight and queued joiners reach capacity
    #[default]
    BlockAtRoomAndQueueMax,
}

impl QueuingPolicy {
    pub fn to_wire(self) -> u8 {
        match self {
            Self::BlockAtRoomMax => 0,
            Self::BlockAtRoomAndQueueMax => 1,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "block_room_max" => Some(Self::BlockAtRoomMax),
            "block_room_and_queue_max" => Some(Self::BlockAtRoomAndQueueMax),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    #[default]
    Ipv4,
    Ipv6,
    Dual,
}

impl ListenMode {
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Ipv4 => 0,
            Self::Ipv6 => 1,
            Self::Dual => 2,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ipv4" => Some(Self::Ipv4),
            "ipv6" => Some(Self::Ipv6),
            "dual" => Some(Self::Dual),
            _ => None,
        }
    }
}

/// Where the relay for a room accepts game traffic. Addresses are kept as
/// configured and resolved whenever a summary is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenEndpoint {
    pub mode: ListenMode,
    pub addr_v4: String,
    pub addr_v6: String,
}

impl Default for ListenEndpoint {
    fn default() -> Self {
        Self {
            mode: ListenMode::Ipv4,
            addr_v4: Ipv4Addr::LOCALHOST.to_string(),
            addr_v6: Ipv6Addr::LOCALHOST.to_string(),
        }
    }
}

impl ListenEndpoint {
    pub fn resolve_v4(&self) -> Result<Ipv4Addr, CodecError> {
        match resolve(&self.addr_v4)? {
            Some(IpAddr::V4(addr)) => Ok(addr),
            None => Ok(Ipv4Addr::UNSPECIFIED),
            Some(IpAddr::V6(_)) => lookup(&self.addr_v4)
                .find_map(|ip| match ip {
                    IpAddr::V4(addr) => Some(addr),
                    IpAddr::V6(_) => None,
                })
                .ok_or_else(|| CodecError::UnresolvedAddress(self.addr_v4.clone())),
        }
    }

    pub fn resolve_v6(&self) -> Result<Ipv6Addr, CodecError> {
        match resolve(&self.addr_v6)? {
            Some(IpAddr::V6(addr)) => Ok(addr),
            None => Ok(Ipv6Addr::UNSPECIFIED),
            Some(IpAddr::V4(addr)) => Ok(addr.to_ipv6_mapped()),
        }
    }
}

/// `None` for an empty address, otherwise a literal IP or the first
/// address a host name resolves to.
fn resolve(addr: &str) -> Result<Option<IpAddr>, CodecError> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Ok(None);
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(Some(ip));
    }
    lookup(addr)
        .next()
        .map(Some)
        .ok_or_else(|| CodecError::UnresolvedAddress(addr.to_string()))
}

fn lookup(host: &str) -> impl Iterator<Item = IpAddr> {
    (host, 0)
        .to_socket_addrs()
        .into_iter()
        .flatten()
        .map(|sock| sock.ip())
}

/// The four relay ports a room advertises
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoomPorts {
    pub stateful_deal: u16,
    pub stateful_sub: u16,
    pub stateless_deal: u16,
    pub stateless_sub: u16,
}

/// Static parameters of a room. `name`, `capacity` and `filter` are set once
/// when the room is bound to a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDescriptor {
    pub id: Uuid,
    pub name: String,
    pub capacity: u16,
    pub queuing_policy: QueuingPolicy,
    pub filter: String,
    pub ports: RoomPorts,
    pub listen: ListenEndpoint,
}

impl RoomDescriptor {
    pub fn new(id: Uuid, ports: RoomPorts, listen: ListenEndpoint) -> Self {
        Self {
            id,
            name: String::new(),
            capacity: 0,
            queuing_policy: QueuingPolicy::default(),
            filter: String::new(),
            ports,
            listen,
        }
    }
}

/// Opaque per-room metadata for game clients. Read-only from the entry API.
#[derive(Debug, Default, Clone)]
pub struct RoomProperties {
    entries: HashMap<String, Vec<u8>>,
}

impl RoomProperties {
    /// The value under `key`, empty when absent.
    pub fn get(&self, key: &str) -> &[u8] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), value.into());
    }
}

#[derive(Debug)]
pub struct Room {
    pub descriptor: RoomDescriptor,
    pub properties: RoomProperties,
    pub(crate) relay: RelayInstance,
    pub(crate) join_slot: JoinSlot,
}

impl Room {
    pub fn new(descriptor: RoomDescriptor) -> Self {
        Self {
            descriptor,
            properties: RoomProperties::default(),
            relay: RelayInstance::new(),
            join_slot: JoinSlot::default(),
        }
    }

    pub fn relay(&self) -> &RelayInstance {
        &self.relay
    }

    pub fn join_slot(&self) -> &JoinSlot {
        &self.join_slot
    }

    /// Copy of what a summary needs, so the room lock can be released
    /// before listen addresses are resolved.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            descriptor: self.descriptor.clone(),
            user_count: self.relay.member_count(),
        }
    }
}

/// Descriptor and member count of a room at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub descriptor: RoomDescriptor,
    pub user_count: usize,
}

impl RoomSnapshot {
    /// Wire summary of the room. Host names in the listen endpoint are
    /// looked up here, so call this without holding the room lock.
    pub fn summary(&self) -> Result<RoomSummary, CodecError> {
        let d = &self.descriptor;
        Ok(RoomSummary {
            id: d.id,
            capacity: d.capacity,
            user_count: u16::try_from(self.user_count).unwrap_or(u16::MAX),
            queuing_policy: d.queuing_policy.to_wire(),
            flags: ROOM_FLAGS,
            stateful_deal_port: d.ports.stateful_deal,
            stateful_sub_port: d.ports.stateful_sub,
            stateless_deal_port: d.ports.stateless_deal,
            stateless_sub_port: d.ports.stateless_sub,
            name: d.name.as_bytes().to_vec(),
            filter: d.filter.as_bytes().to_vec(),
            listen_mode: d.listen.mode.to_wire(),
            listen_addr_v4: d.listen.resolve_v4()?,
            listen_addr_v6: d.listen.resolve_v6()?,
        })
    }
}
