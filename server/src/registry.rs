//! Session registry: the authoritative record of who is connected, which
//! group they belong to and what they have done in the current round.
//!
//! The registry is plain data. It never sends messages or takes locks of its
//! own; the session orchestrator owns it and performs every compound
//! check-and-update while holding the session lock.

use crate::groups::GroupId;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque identity of one client connection.
///
/// Ids are handed out in increasing order, so iterating a map keyed by
/// `ConnectionId` visits connections in the order they arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Participation status of a player.
///
/// A single status replaces separate viewer/connected flags so the two can
/// never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Plays rounds and must report a score before a round can complete.
    Active,
    /// Quit active play but still connected and receiving updates.
    Viewer,
    /// Socket closed. Kept so group membership counts stay stable.
    Disconnected,
}

/// Per-connection player state, created when a connection authenticates.
#[derive(Debug, Clone)]
pub struct Player {
    pub username: String,
    pub group_id: GroupId,
    pub status: PlayerStatus,
    /// Reset to false whenever a group is re-armed for a new round.
    pub registration_confirmed: bool,
    /// Reset to false once replay consensus is reached.
    pub play_again_requested: bool,
    /// Score reported for the current round, cleared on reset.
    pub last_score: Option<u32>,
}

impl Player {
    pub fn new(username: String, group_id: GroupId) -> Self {
        Self {
            username,
            group_id,
            status: PlayerStatus::Active,
            registration_confirmed: false,
            play_again_requested: false,
            last_score: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status != PlayerStatus::Disconnected
    }

    pub fn is_active(&self) -> bool {
        self.status == PlayerStatus::Active
    }

    /// Clears everything scoped to a single round.
    pub fn reset_round(&mut self) {
        self.registration_confirmed = false;
        self.play_again_requested = false;
        self.last_score = None;
    }
}

/// Authenticated players indexed by connection.
#[derive(Debug, Default)]
pub struct Registry {
    players: BTreeMap<ConnectionId, Player>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ConnectionId, player: Player) {
        self.players.insert(id, player);
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Finds the connected player currently holding `username`.
    pub fn find_connected(&self, username: &str) -> Option<ConnectionId> {
        self.players
            .iter()
            .find(|(_, player)| player.is_connected() && player.username == username)
            .map(|(id, _)| *id)
    }

    /// Connected players in connection order.
    pub fn connected(&self) -> impl Iterator<Item = (ConnectionId, &Player)> {
        self.players
            .iter()
            .filter(|(_, player)| player.is_connected())
            .map(|(id, player)| (*id, player))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnectionId, &mut Player)> {
        self.players.iter_mut().map(|(id, player)| (*id, player))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
