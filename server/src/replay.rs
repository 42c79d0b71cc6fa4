//! Play-again barrier.
//!
//! After a round ends, players vote to play again. Depending on
//! [`ReplayScope`], consensus needs every connected player on the server or
//! only the connected members of the voter's group. Disconnected players leave
//! the electorate, so a dropped connection cannot stall replay forever.

use crate::config::ReplayScope;
use crate::groups::{GroupId, GroupState, GroupTable};
use crate::registry::{ConnectionId, Registry};

/// Whether a member of a group in `state` may vote.
///
/// Groups that are mid-round cannot vote. Under global consensus, members of
/// a group that never filled also vote, since they count towards unanimity.
pub fn can_vote(scope: ReplayScope, state: GroupState) -> bool {
    match state {
        GroupState::AwaitingReplay => true,
        GroupState::Filling => scope == ReplayScope::Global,
        GroupState::AwaitingRegistration | GroupState::Playing => false,
    }
}

/// Connected players whose vote is required.
pub fn electorate(
    scope: ReplayScope,
    group_id: GroupId,
    groups: &GroupTable,
    registry: &Registry,
) -> Vec<ConnectionId> {
    match scope {
        ReplayScope::Global => registry.connected().map(|(id, _)| id).collect(),
        ReplayScope::PerGroup => groups
            .get(group_id)
            .map(|group| {
                group
                    .members()
                    .iter()
                    .copied()
                    .filter(|id| registry.get(*id).map(|p| p.is_connected()).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Returns `(votes, required)` for the electorate of `group_id`.
pub fn tally(
    scope: ReplayScope,
    group_id: GroupId,
    groups: &GroupTable,
    registry: &Registry,
) -> (usize, usize) {
    let voters = electorate(scope, group_id, groups, registry);
    let votes = voters
        .iter()
        .filter(|id| {
            registry
                .get(**id)
                .map(|player| player.play_again_requested)
                .unwrap_or(false)
        })
        .count();
    (votes, voters.len())
}

pub fn consensus_reached(
    scope: ReplayScope,
    group_id: GroupId,
    groups: &GroupTable,
    registry: &Registry,
) -> bool {
    let (votes, required) = tally(scope, group_id, groups, registry);
    required > 0 && votes == required
}

/// Groups to re-arm once consensus is reached. Groups that never filled keep
/// waiting for members instead.
pub fn groups_to_reset(scope: ReplayScope, group_id: GroupId, groups: &GroupTable) -> Vec<GroupId> {
    match scope {
        ReplayScope::Global => groups
            .iter()
            .filter(|group| group.state() != GroupState::Filling)
            .map(|group| group.id())
            .collect(),
        ReplayScope::PerGroup => groups
            .get(group_id)
            .filter(|group| group.state() != GroupState::Filling)
            .map(|group| vec![group.id()])
            .unwrap_or_default(),
    }
}
