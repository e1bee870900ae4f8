//! Join rendezvous: admission control and the prepare/complete handshake
//!
//! Clients cannot hold a connection open, so joining is a polling protocol
//! keyed by an opaque client-chosen seed:
//!
//! 1. The client repeatedly submits a poll. While another seed holds the
//!    room's single join slot, or other seeds are queued ahead of it, the
//!    answer is [`PollOutcome::KeepPolling`] and the seed waits in a FIFO.
//! 2. When the slot is free and the seed is first in line, it is admitted:
//!    it receives a participant id and the roster, and the slot is held for
//!    it ([`PollOutcome::Prepared`]).
//! 3. The client confirms with a complete, which frees the slot for the next
//!    seed in line.
//!
//! A slot that is never completed is reclaimed by the first poll arriving
//! more than `join_timeout` seconds after admission. There is no timer; the
//! sweep runs lazily on poll.
//!
//! Every function here expects the caller to hold the room's lock for the
//! whole call.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::CodecError;
use crate::room::{QueuingPolicy, Room};

/// An admitted seed waiting for its complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub seed_hex: String,
    pub accepted_at: i64,
}

/// Handshake state of one room. At most one seed is in flight.
#[derive(Debug, Default)]
pub struct JoinSlot {
    in_flight: Option<JoinRequest>,
    waiting: VecDeque<Vec<u8>>,
    expired: Vec<JoinRequest>,
}

impl JoinSlot {
    pub fn in_flight(&self) -> Option<&JoinRequest> {
        self.in_flight.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    pub fn waiting(&self) -> impl Iterator<Item = &[u8]> {
        self.waiting.iter().map(Vec::as_slice)
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn expired(&self) -> &[JoinRequest] {
        &self.expired
    }

    fn is_waiting(&self, seed: &[u8]) -> bool {
        self.waiting.iter().any(|queued| queued.as_slice() == seed)
    }

    fn enqueue(&mut self, seed: &[u8]) {
        if !self.is_waiting(seed) {
            self.waiting.push_back(seed.to_vec());
        }
    }

    fn holds(&self, seed_hex: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|request| request.seed_hex == seed_hex)
    }
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Admitted; the encoded [`crate::codec::JoinPrepareResponse`]
    Prepared(Bytes),
    /// Not admitted yet; poll again
    KeepPolling,
    /// The room's queuing policy refuses more joiners
    RoomFull,
    /// This seed's earlier admission expired before it was completed
    TimedOut,
}

/// Result of a complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed,
    /// The seed does not hold the slot, or nothing is in flight
    SeedMismatch,
}

/// Whether the room's queuing policy lets `seed` proceed.
///
/// A seed already sitting in the queue is not counted against itself, so a
/// queued client is never locked out by its own place in line.
pub fn admission_open(room: &Room, seed: &[u8]) -> bool {
    let capacity = usize::from(room.descriptor.capacity);
    let members = room.relay.member_count();
    match room.descriptor.queuing_policy {
        QueuingPolicy::BlockAtRoomMax => members < capacity,
        QueuingPolicy::BlockAtRoomAndQueueMax => {
            let slot = &room.join_slot;
            let in_flight = usize::from(slot.in_flight.is_some());
            let queued = slot.waiting.len() - usize::from(slot.is_waiting(seed));
            members + in_flight + queued < capacity
        }
    }
}

/// One poll step for `seed`.
///
/// An encoding failure is returned as an error after the participant id has
/// already been consumed; the id is not given back.
pub fn poll(
    room: &mut Room,
    seed: &[u8],
    now: i64,
    join_timeout_secs: i64,
) -> Result<PollOutcome, CodecError> {
    if !admission_open(room, seed) {
        debug!(room = %room.descriptor.name, capacity = room.descriptor.capacity, "room full");
        return Ok(PollOutcome::RoomFull);
    }

    let seed_hex = hex::encode(seed);
    let slot = &mut room.join_slot;

    let past_deadline = |r: &mut JoinRequest| now > r.accepted_at.saturating_add(join_timeout_secs);
    if let Some(request) = slot.in_flight.take_if(past_deadline) {
        info!(room = %room.descriptor.name, seed = %request.seed_hex, "join slot timed out");
        slot.expired.push(request);
    }

    // Only the first poll after an expiry sees it; the list is drained either way.
    if !slot.expired.is_empty() {
        let timed_out = slot.expired.iter().any(|r| r.seed_hex == seed_hex);
        slot.expired.clear();
        if timed_out {
            return Ok(PollOutcome::TimedOut);
        }
    }

    if slot.holds(&seed_hex) {
        return Ok(PollOutcome::KeepPolling);
    }

    let at_head = slot.waiting.front().is_some_and(|head| head.as_slice() == seed);
    if !slot.is_idle() || !(slot.waiting.is_empty() || at_head) {
        slot.enqueue(seed);
        debug!(room = %room.descriptor.name, seed = %seed_hex, queued = slot.waiting.len(), "keep polling");
        return Ok(PollOutcome::KeepPolling);
    }

    let response = room.relay.assign(seed, now);
    info!(
        room = %room.descriptor.name,
        id = response.assigned_id,
        seed = %seed_hex,
        "join prepared"
    );
    let payload = response.encode()?;

    let slot = &mut room.join_slot;
    if at_head {
        slot.waiting.pop_front();
    }
    slot.in_flight = Some(JoinRequest {
        seed_hex,
        accepted_at: now,
    });
    Ok(PollOutcome::Prepared(payload))
}

/// Release the join slot if `seed` holds it.
pub fn complete(room: &mut Room, seed: &[u8]) -> CompleteOutcome {
    let seed_hex = hex::encode(seed);
    if room.join_slot.holds(&seed_hex) {
        room.join_slot.in_flight = None;
        info!(room = %room.descriptor.name, seed = %seed_hex, "join completed");
        CompleteOutcome::Completed
    } else {
        debug!(
            room = %room.descriptor.name,
            seed = %seed_hex,
            in_flight = ?room.join_slot.in_flight.as_ref().map(|r| &r.seed_hex),
            "seed does not hold the join slot"
        );
        CompleteOutcome::SeedMismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JoinPrepareResponse;
    use crate::room::{ListenEndpoint, RoomDescriptor, RoomPorts};
    use uuid::Uuid;

    const TIMEOUT: i64 = 10;

    fn room(capacity: u16, policy: QueuingPolicy) -> Room {
        let mut descriptor =
            RoomDescriptor::new(Uuid::new_v4(), RoomPorts::default(), ListenEndpoint::default());
        descriptor.name = "arena".into();
        descriptor.capacity = capacity;
        descriptor.queuing_policy = policy;
        Room::new(descriptor)
    }

    fn prepared(outcome: PollOutcome) -> JoinPrepareResponse {
        match outcome {
            PollOutcome::Prepared(bytes) => JoinPrepareResponse::decode(&bytes).unwrap(),
            other => panic!("expected Prepared, got {other:?}"),
        }
    }

    #[test]
    fn first_joiner_is_master() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        let outcome = poll(&mut room, &[0xAA, 0xBB], 0, TIMEOUT).unwrap();

        let PollOutcome::Prepared(bytes) = &outcome else {
            panic!("expected Prepared, got {outcome:?}");
        };
        assert_eq!(bytes.len(), 12);
        let res = prepared(outcome);
        assert_eq!((res.master_id, res.assigned_id), (1, 1));
        assert!(res.joined_ids.is_empty() && res.names.is_empty());
        assert_eq!(room.join_slot.in_flight().unwrap().seed_hex, "aabb");
    }

    #[test]
    fn second_seed_waits_until_complete() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());

        assert_eq!(poll(&mut room, b"b", 1, TIMEOUT).unwrap(), PollOutcome::KeepPolling);
        assert_eq!(poll(&mut room, b"b", 2, TIMEOUT).unwrap(), PollOutcome::KeepPolling);
        assert_eq!(room.join_slot.waiting_len(), 1, "queued once");

        assert_eq!(complete(&mut room, b"a"), CompleteOutcome::Completed);
        let res = prepared(poll(&mut room, b"b", 3, TIMEOUT).unwrap());
        assert_eq!(res.assigned_id, 2);
        assert_eq!(res.master_id, 1);
        assert_eq!(res.joined_ids, vec![1]);
        assert_eq!(room.join_slot.waiting_len(), 0);
    }

    #[test]
    fn queue_is_first_in_first_out() {
        let mut room = room(8, QueuingPolicy::BlockAtRoomMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());
        poll(&mut room, b"b", 0, TIMEOUT).unwrap();
        poll(&mut room, b"c", 0, TIMEOUT).unwrap();
        complete(&mut room, b"a");

        // "c" is not at the head even though the slot is free.
        assert_eq!(poll(&mut room, b"c", 1, TIMEOUT).unwrap(), PollOutcome::KeepPolling);
        prepared(poll(&mut room, b"b", 1, TIMEOUT).unwrap());
        complete(&mut room, b"b");
        prepared(poll(&mut room, b"c", 2, TIMEOUT).unwrap());
    }

    #[test]
    fn in_flight_owner_repolling_is_not_queued() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());
        assert_eq!(poll(&mut room, b"a", 1, TIMEOUT).unwrap(), PollOutcome::KeepPolling);
        assert_eq!(room.join_slot.waiting_len(), 0);
    }

    #[test]
    fn slot_survives_until_timeout_passes() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        prepared(poll(&mut room, b"a", 100, TIMEOUT).unwrap());

        // Exactly at the deadline the slot is still held.
        assert_eq!(poll(&mut room, b"b", 110, TIMEOUT).unwrap(), PollOutcome::KeepPolling);
        assert!(room.join_slot.in_flight().is_some());

        // One second later "b" evicts it and, being at the head, is admitted.
        let res = prepared(poll(&mut room, b"b", 111, TIMEOUT).unwrap());
        assert_eq!(res.assigned_id, 2);
        assert_eq!(room.join_slot.in_flight().unwrap().seed_hex, hex::encode(b"b"));
        assert!(room.join_slot.expired().is_empty());
    }

    #[test]
    fn huge_timeout_never_expires() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        prepared(poll(&mut room, b"a", 100, i64::MAX).unwrap());

        assert_eq!(poll(&mut room, b"b", i64::MAX, i64::MAX).unwrap(), PollOutcome::KeepPolling);
        assert_eq!(room.join_slot.in_flight().unwrap().seed_hex, hex::encode(b"a"));
    }

    #[test]
    fn expired_owner_is_told_it_timed_out() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());

        assert_eq!(poll(&mut room, b"a", 20, TIMEOUT).unwrap(), PollOutcome::TimedOut);
        assert!(room.join_slot.is_idle());
        assert!(room.join_slot.expired().is_empty());
        assert_eq!(complete(&mut room, b"a"), CompleteOutcome::SeedMismatch);
    }

    #[test]
    fn timeout_notice_is_lost_to_the_first_other_poller() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());

        // "b" sweeps and drains the expired list, then takes the slot.
        prepared(poll(&mut room, b"b", 20, TIMEOUT).unwrap());
        assert_eq!(poll(&mut room, b"a", 21, TIMEOUT).unwrap(), PollOutcome::KeepPolling);
    }

    #[test]
    fn complete_with_wrong_seed_leaves_slot_held() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        assert_eq!(complete(&mut room, b"a"), CompleteOutcome::SeedMismatch);

        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());
        assert_eq!(complete(&mut room, b"b"), CompleteOutcome::SeedMismatch);
        assert_eq!(room.join_slot.in_flight().unwrap().seed_hex, hex::encode(b"a"));
    }

    #[test]
    fn block_at_room_max_ignores_queue() {
        let mut room = room(2, QueuingPolicy::BlockAtRoomMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());
        complete(&mut room, b"a");
        prepared(poll(&mut room, b"b", 0, TIMEOUT).unwrap());
        complete(&mut room, b"b");

        assert_eq!(poll(&mut room, b"c", 0, TIMEOUT).unwrap(), PollOutcome::RoomFull);
        assert_eq!(room.join_slot.waiting_len(), 0);
    }

    #[test]
    fn block_at_room_and_queue_max_counts_in_flight() {
        let mut room = room(2, QueuingPolicy::BlockAtRoomAndQueueMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());
        complete(&mut room, b"a");
        room.join_slot.in_flight = Some(JoinRequest {
            seed_hex: hex::encode(b"x"),
            accepted_at: 0,
        });

        // 1 member + 1 in flight reaches capacity 2.
        assert_eq!(poll(&mut room, b"c", 0, TIMEOUT).unwrap(), PollOutcome::RoomFull);
    }

    #[test]
    fn block_at_room_and_queue_max_lets_queued_seed_through() {
        let mut room = room(2, QueuingPolicy::BlockAtRoomAndQueueMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());
        complete(&mut room, b"a");
        room.join_slot.waiting.push_back(b"b".to_vec());

        // 1 member, 0 in flight, 1 waiting (the caller itself): not rejected.
        assert!(admission_open(&room, b"b"));
        prepared(poll(&mut room, b"b", 1, TIMEOUT).unwrap());
    }

    #[test]
    fn block_at_room_and_queue_max_queues_below_capacity() {
        let mut room = room(3, QueuingPolicy::BlockAtRoomAndQueueMax);
        prepared(poll(&mut room, b"a", 0, TIMEOUT).unwrap());
        complete(&mut room, b"a");
        room.join_slot.waiting.push_back(b"b".to_vec());

        // 1 member + 1 waiting < 3: a distinct seed joins the queue.
        assert_eq!(poll(&mut room, b"c", 0, TIMEOUT).unwrap(), PollOutcome::KeepPolling);
        assert_eq!(room.join_slot.waiting().collect::<Vec<_>>(), vec![&b"b"[..], &b"c"[..]]);

        // Now 1 + 2 reaches capacity for anyone new.
        assert_eq!(poll(&mut room, b"d", 0, TIMEOUT).unwrap(), PollOutcome::RoomFull);
    }

    #[test]
    fn encode_failure_keeps_consumed_id() {
        let mut room = room(4, QueuingPolicy::BlockAtRoomMax);
        room.relay.push_name("n".repeat(usize::from(u16::MAX) + 1));

        let err = poll(&mut room, b"a", 0, TIMEOUT).unwrap_err();
        assert!(matches!(err, CodecError::FieldTooLong { .. }));
        assert_eq!(room.relay.last_assigned_id(), 1);
        assert_eq!(room.relay.id_of(b"a"), Some(1));
        assert!(room.join_slot.is_idle());
    }
}
