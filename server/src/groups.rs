//! Group allocation.
//!
//! Authenticated connections are bucketed into groups of a fixed size using a
//! deterministic first-fit scan in creation order. A group that reaches
//! capacity leaves `Filling` exactly once and is handed to the registration
//! barrier. Groups are never merged, split or destroyed; they only cycle
//! through their states.

use crate::registry::ConnectionId;
use crate::scoring::ScoreTable;
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Still below capacity. The last group may stay here indefinitely.
    Filling,
    /// Full and waiting for every member to confirm intent to play.
    AwaitingRegistration,
    Playing,
    /// Round finished, waiting for replay consensus.
    AwaitingReplay,
}

/// Published to watchers whenever a group changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub state: GroupState,
    /// Number of rounds released so far; the current round while playing.
    pub round: u32,
}

#[derive(Debug)]
pub struct Group {
    id: GroupId,
    members: Vec<ConnectionId>,
    state: GroupState,
    round: u32,
    scores: ScoreTable,
    phase: watch::Sender<GroupSnapshot>,
}

impl Group {
    fn new(id: GroupId) -> Self {
        let (phase, _) = watch::channel(GroupSnapshot {
            state: GroupState::Filling,
            round: 0,
        });
        Self {
            id,
            members: Vec::new(),
            state: GroupState::Filling,
            round: 0,
            scores: ScoreTable::new(),
            phase,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Members in the order they were placed.
    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            state: self.state,
            round: self.round,
        }
    }

    pub fn scores(&self) -> &ScoreTable {
        &self.scores
    }

    pub fn scores_mut(&mut self) -> &mut ScoreTable {
        &mut self.scores
    }

    pub fn subscribe(&self) -> watch::Receiver<GroupSnapshot> {
        self.phase.subscribe()
    }

    pub fn transition(&mut self, state: GroupState) {
        self.state = state;
        self.publish();
    }

    /// Moves the group into `Playing` for a fresh round and returns the new
    /// round number.
    pub fn begin_round(&mut self) -> u32 {
        self.round += 1;
        self.scores.clear();
        self.transition(GroupState::Playing);
        self.round
    }

    fn publish(&self) {
        self.phase.send_replace(self.snapshot());
    }
}

/// Result of placing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub group_id: GroupId,
    /// True when this placement filled the group and moved it to
    /// `AwaitingRegistration`.
    pub filled: bool,
}

#[derive(Debug)]
pub struct GroupTable {
    groups: Vec<Group>,
    capacity: usize,
}

impl GroupTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Places `connection` in the first group with a free slot, opening a new
    /// group when every existing one is full.
    pub fn allocate(&mut self, connection: ConnectionId) -> Placement {
        let capacity = self.capacity;
        let index = match self
            .groups
            .iter()
            .position(|group| group.members.len() < capacity)
        {
            Some(index) => index,
            None => {
                let id = GroupId(self.groups.len() as u32 + 1);
                self.groups.push(Group::new(id));
                self.groups.len() - 1
            }
        };

        let group = &mut self.groups[index];
        group.members.push(connection);

        let filled = group.members.len() == capacity && group.state == GroupState::Filling;
        if filled {
            group.transition(GroupState::AwaitingRegistration);
        }

        Placement {
            group_id: group.id,
            filled,
        }
    }

    pub fn get(&self, id: GroupId) -> Option<&Group> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.groups.get(index)
    }

    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.groups.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Group> {
        self.groups.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
