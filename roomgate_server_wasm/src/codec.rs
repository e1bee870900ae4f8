//! Binary wire codec for game-engine clients
//!
//! All integers are little-endian and structures are packed with no implicit
//! padding; native clients read these layouts directly into C structs.
//!
//! ## RoomSummary (565 bytes)
//!
//! ```text
//! id[16] capacity:u16 userCount:u16 queuingPolicy:u8 flags:u8
//! statefulDeal:u16 statefulSub:u16 statelessDeal:u16 statelessSub:u16
//! nameLen:u8 filterLen:u8 name[256] filter[256]
//! listenMode:u8 listenAddrV4[4] listenAddrV6[16]
//! ```
//!
//! ## JoinPrepareResponse
//!
//! ```text
//! masterId:u32 assignedId:u32 joinedIdsCount:u16 namesCount:u16
//! joinedIds[joinedIdsCount]:u32  pad[joinedIdsCount % 4]
//! { nameLen:u16 name[nameLen] pad[(2 + nameLen) % 4] } * namesCount
//! ```
//!
//! The padding lengths are what existing clients expect and are kept as is,
//! even though they do not land the following fields on 4-byte boundaries.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::CodecError;

/// Encoded size of a [`RoomSummary`]
pub const ROOM_SUMMARY_LEN: usize = 565;

/// Width of the fixed name and filter fields in a room summary
pub const TEXT_FIELD_LEN: usize = 256;

/// Longest name or filter a room summary can carry (its length is one byte)
pub const MAX_TEXT_LEN: usize = 255;

/// Fixed header size of a [`JoinPrepareResponse`]
pub const JOIN_RESPONSE_HEADER_LEN: usize = 12;

/// Flags byte emitted in every room summary
pub const ROOM_FLAGS: u8 = 0x07;

/// Response codes at the head of directory responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCode {
    Ok = 0,
    OkNoRoom = 1,
    OkRoomAssignAndCreated = 2,
    NgCreateRoomAlreadyExists = 3,
    NgCreateRoomCapacityOver = 4,
    NgRequestReadFailed = 5,
    NgResponseWriteFailed = 6,
}

impl ResponseCode {
    pub fn from_wire(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::Ok,
            1 => Self::OkNoRoom,
            2 => Self::OkRoomAssignAndCreated,
            3 => Self::NgCreateRoomAlreadyExists,
            4 => Self::NgCreateRoomCapacityOver,
            5 => Self::NgRequestReadFailed,
            6 => Self::NgResponseWriteFailed,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> u16 {
        self as u16
    }
}

/// A bare response: the code followed by a zero `u16` for alignment.
pub fn response_code_bytes(code: ResponseCode) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u16_le(code.to_wire());
    buf.put_u16_le(0);
    buf.freeze()
}

/// Wire view of one room, as returned by the list and create exchanges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub id: Uuid,
    pub capacity: u16,
    pub user_count: u16,
    pub queuing_policy: u8,
    pub flags: u8,
    pub stateful_deal_port: u16,
    pub stateful_sub_port: u16,
    pub stateless_deal_port: u16,
    pub stateless_sub_port: u16,
    pub name: Vec<u8>,
    pub filter: Vec<u8>,
    pub listen_mode: u8,
    pub listen_addr_v4: Ipv4Addr,
    pub listen_addr_v6: Ipv6Addr,
}

impl RoomSummary {
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let name_len = text_len("room name", &self.name)?;
        let filter_len = text_len("room filter", &self.filter)?;

        buf.reserve(ROOM_SUMMARY_LEN);
        buf.put_slice(self.id.as_bytes());
        buf.put_u16_le(self.capacity);
        buf.put_u16_le(self.user_count);
        buf.put_u8(self.queuing_policy);
        buf.put_u8(self.flags);
        buf.put_u16_le(self.stateful_deal_port);
        buf.put_u16_le(self.stateful_sub_port);
        buf.put_u16_le(self.stateless_deal_port);
        buf.put_u16_le(self.stateless_sub_port);
        buf.put_u8(name_len);
        buf.put_u8(filter_len);
        put_text_field(buf, &self.name);
        put_text_field(buf, &self.filter);
        buf.put_u8(self.listen_mode);
        buf.put_slice(&self.listen_addr_v4.octets());
        buf.put_slice(&self.listen_addr_v6.octets());
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, CodecError> {
        ensure(&*buf, ROOM_SUMMARY_LEN)?;

        let mut id = [0u8; 16];
        buf.copy_to_slice(&mut id);
        let capacity = buf.get_u16_le();
        let user_count = buf.get_u16_le();
        let queuing_policy = buf.get_u8();
        let flags = buf.get_u8();
        let stateful_deal_port = buf.get_u16_le();
        let stateful_sub_port = buf.get_u16_le();
        let stateless_deal_port = buf.get_u16_le();
        let stateless_sub_port = buf.get_u16_le();
        let name_len = usize::from(buf.get_u8());
        let filter_len = usize::from(buf.get_u8());

        let mut field = [0u8; TEXT_FIELD_LEN];
        buf.copy_to_slice(&mut field);
        let name = field[..name_len].to_vec();
        buf.copy_to_slice(&mut field);
        let filter = field[..filter_len].to_vec();

        let listen_mode = buf.get_u8();
        let mut v4 = [0u8; 4];
        buf.copy_to_slice(&mut v4);
        let mut v6 = [0u8; 16];
        buf.copy_to_slice(&mut v6);

        Ok(Self {
            id: Uuid::from_bytes(id),
            capacity,
            user_count,
            queuing_policy,
            flags,
            stateful_deal_port,
            stateful_sub_port,
            stateless_deal_port,
            stateless_sub_port,
            name,
            filter,
            listen_mode,
            listen_addr_v4: Ipv4Addr::from(v4),
            listen_addr_v6: Ipv6Addr::from(v6),
        })
    }
}

fn text_len(field: &'static str, text: &[u8]) -> Result<u8, CodecError> {
    u8::try_from(text.len()).map_err(|_| CodecError::FieldTooLong {
        field,
        len: text.len(),
        max: MAX_TEXT_LEN,
    })
}

fn put_text_field(buf: &mut BytesMut, text: &[u8]) {
    buf.put_slice(text);
    buf.put_bytes(0, TEXT_FIELD_LEN - text.len());
}

/// Payload handed to a client whose join was prepared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPrepareResponse {
    pub master_id: u32,
    pub assigned_id: u32,
    /// Ids that were members before this join; never contains `assigned_id`.
    pub joined_ids: Vec<u32>,
    pub names: Vec<String>,
}

impl JoinPrepareResponse {
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let ids_count = count_u16("joined ids", self.joined_ids.len())?;
        let names_count = count_u16("names", self.names.len())?;

        let mut buf = BytesMut::with_capacity(JOIN_RESPONSE_HEADER_LEN + self.joined_ids.len() * 4);
        buf.put_u32_le(self.master_id);
        buf.put_u32_le(self.assigned_id);
        buf.put_u16_le(ids_count);
        buf.put_u16_le(names_count);
        for id in &self.joined_ids {
            buf.put_u32_le(*id);
        }
        buf.put_bytes(0, self.joined_ids.len() % 4);

        for name in &self.names {
            let name_len = count_u16("member name", name.len())?;
            buf.put_u16_le(name_len);
            buf.put_slice(name.as_bytes());
            buf.put_bytes(0, (2 + name.len()) % 4);
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, CodecError> {
        ensure(&buf, JOIN_RESPONSE_HEADER_LEN)?;
        let master_id = buf.get_u32_le();
        let assigned_id = buf.get_u32_le();
        let ids_count = usize::from(buf.get_u16_le());
        let names_count = usize::from(buf.get_u16_le());

        ensure(&buf, ids_count * 4 + ids_count % 4)?;
        let joined_ids = (0..ids_count).map(|_| buf.get_u32_le()).collect();
        buf.advance(ids_count % 4);

        let mut names = Vec::with_capacity(names_count);
        for _ in 0..names_count {
            ensure(&buf, 2)?;
            let name_len = usize::from(buf.get_u16_le());
            let pad = (2 + name_len) % 4;
            ensure(&buf, name_len + pad)?;
            let name = String::from_utf8(buf[..name_len].to_vec())
                .map_err(|_| CodecError::InvalidUtf8("member name"))?;
            buf.advance(name_len + pad);
            names.push(name);
        }

        Ok(Self {
            master_id,
            assigned_id,
            joined_ids,
            names,
        })
    }
}

fn count_u16(field: &'static str, len: usize) -> Result<u16, CodecError> {
    u16::try_from(len).map_err(|_| CodecError::FieldTooLong {
        field,
        len,
        max: usize::from(u16::MAX),
    })
}

/// Read a join seed (`seedLen:u16` + bytes) from the front of a request body.
pub fn decode_join_seed(buf: &mut impl Buf) -> Result<Vec<u8>, CodecError> {
    ensure(&*buf, 2)?;
    let seed_len = usize::from(buf.get_u16_le());
    ensure(&*buf, seed_len)?;
    let mut seed = vec![0u8; seed_len];
    buf.copy_to_slice(&mut seed);
    Ok(seed)
}

pub fn encode_join_seed(seed: &[u8]) -> Result<Bytes, CodecError> {
    let seed_len = count_u16("join seed", seed.len())?;
    let mut buf = BytesMut::with_capacity(2 + seed.len());
    buf.put_u16_le(seed_len);
    buf.put_slice(seed);
    Ok(buf.freeze())
}

/// Body of the list exchange: `OK, count, summaries...` or `OK_NO_ROOM, 0`.
pub fn encode_room_list(rooms: &[RoomSummary]) -> Result<Bytes, CodecError> {
    if rooms.is_empty() {
        return Ok(response_code_bytes(ResponseCode::OkNoRoom));
    }
    let count = count_u16("room list", rooms.len())?;
    let mut buf = BytesMut::with_capacity(4 + rooms.len() * ROOM_SUMMARY_LEN);
    buf.put_u16_le(ResponseCode::Ok.to_wire());
    buf.put_u16_le(count);
    for room in rooms {
        room.encode_into(&mut buf)?;
    }
    Ok(buf.freeze())
}

/// Body of the create exchange: the code, a zero `u16`, then the summary.
pub fn encode_create_response(code: ResponseCode, room: &RoomSummary) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(4 + ROOM_SUMMARY_LEN);
    buf.put_u16_le(code.to_wire());
    buf.put_u16_le(0);
    room.encode_into(&mut buf)?;
    Ok(buf.freeze())
}

/// Body of the property exchange: `OK, len:u16, value`.
pub fn encode_property(value: &[u8]) -> Result<Bytes, CodecError> {
    let len = count_u16("property", value.len())?;
    let mut buf = BytesMut::with_capacity(4 + value.len());
    buf.put_u16_le(ResponseCode::Ok.to_wire());
    buf.put_u16_le(len);
    buf.put_slice(value);
    Ok(buf.freeze())
}

fn ensure(buf: &impl Buf, needed: usize) -> Result<(), CodecError> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(CodecError::Truncated { needed, remaining });
    }
    Ok(())
}
