//! Live membership of a single room
//!
//! A [`RelayInstance`] records who has been admitted: the participant id
//! handed to each seed, display names, last heartbeat, and which id is the
//! room master. Only the join rendezvous mutates it.
//!
//! Ids come from a per-room counter that never goes backwards and never
//! hands an id out twice, even when a seed is admitted again.

use std::collections::{BTreeMap, HashMap};

use crate::codec::JoinPrepareResponse;

/// Participant id inside a room
pub type ParticipantId = u32;

#[derive(Debug, Clone)]
pub struct RelayInstance {
    master_needed: bool,
    master_id: ParticipantId,
    last_assigned_id: ParticipantId,
    seed_to_id: HashMap<Vec<u8>, ParticipantId>,
    id_to_seed: BTreeMap<ParticipantId, Vec<u8>>,
    names: Vec<String>,
    heartbeats: BTreeMap<ParticipantId, i64>,
}

impl Default for RelayInstance {
    fn default() -> Self {
        Self {
            master_needed: true,
            master_id: 0,
            last_assigned_id: 0,
            seed_to_id: HashMap::new(),
            id_to_seed: BTreeMap::new(),
            names: Vec::new(),
            heartbeats: BTreeMap::new(),
        }
    }
}

impl RelayInstance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of admitted participants.
    pub fn member_count(&self) -> usize {
        self.id_to_seed.len()
    }

    pub fn master_id(&self) -> ParticipantId {
        self.master_id
    }

    pub fn last_assigned_id(&self) -> ParticipantId {
        self.last_assigned_id
    }

    pub fn id_of(&self, seed: &[u8]) -> Option<ParticipantId> {
        self.seed_to_id.get(seed).copied()
    }

    pub fn seed_of(&self, id: ParticipantId) -> Option<&[u8]> {
        self.id_to_seed.get(&id).map(Vec::as_slice)
    }

    pub fn heartbeat(&self, id: ParticipantId) -> Option<i64> {
        self.heartbeats.get(&id).copied()
    }

    pub fn member_ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.id_to_seed.keys().copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Append a display name to the roster handed to future joiners.
    pub fn push_name(&mut self, name: impl Into<String>) {
        self.names.push(name.into());
    }

    /// Give `seed` the next participant id and describe the room to it.
    ///
    /// The returned roster lists the members present before this call; the
    /// new id is only reported as `assigned_id`. A seed that already held an
    /// id loses the old one so the seed and id maps stay inverse.
    pub fn assign(&mut self, seed: &[u8], now: i64) -> JoinPrepareResponse {
        self.last_assigned_id += 1;
        let assigned_id = self.last_assigned_id;
        if self.master_needed {
            self.master_needed = false;
            self.master_id = assigned_id;
        }

        if let Some(stale) = self.seed_to_id.remove(seed) {
            self.id_to_seed.remove(&stale);
            self.heartbeats.remove(&stale);
        }
        let joined_ids: Vec<ParticipantId> = self.member_ids().collect();

        self.seed_to_id.insert(seed.to_vec(), assigned_id);
        self.id_to_seed.insert(assigned_id, seed.to_vec());
        self.heartbeats.insert(assigned_id, now);

        JoinPrepareResponse {
            master_id: self.master_id,
            assigned_id,
            joined_ids,
            names: self.names.clone(),
        }
    }
}
