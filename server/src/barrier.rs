//! Registration barrier.
//!
//! A full group waits in `AwaitingRegistration` until every connected member
//! has confirmed intent to play. The check runs after every confirmation (and
//! after every disconnect, which shrinks the set of members to wait for), so
//! release happens exactly when the predicate first becomes true. Watchers
//! that need to block on release subscribe to the group's snapshot channel
//! instead of polling.

use crate::groups::{Group, GroupSnapshot, GroupState};
use crate::registry::{ConnectionId, Registry};
use tokio::sync::watch;

/// Connected members of `group` that have not confirmed yet.
pub fn pending_confirmations(group: &Group, registry: &Registry) -> Vec<ConnectionId> {
    group
        .members()
        .iter()
        .copied()
        .filter(|id| {
            registry
                .get(*id)
                .map(|player| player.is_connected() && !player.registration_confirmed)
                .unwrap_or(false)
        })
        .collect()
}

/// True when `group` is waiting for registrations and every connected member
/// has confirmed. A group whose members have all disconnected never releases.
pub fn ready_to_release(group: &Group, registry: &Registry) -> bool {
    if group.state() != GroupState::AwaitingRegistration {
        return false;
    }

    let any_connected = group
        .members()
        .iter()
        .any(|id| registry.get(*id).map(|p| p.is_connected()).unwrap_or(false));

    any_connected && pending_confirmations(group, registry).is_empty()
}

/// Waits until the watched group is playing round `round` or later.
///
/// Returns `None` if the group's sender goes away. There is deliberately no
/// timeout: a member who never confirms keeps the group waiting.
pub async fn wait_for_round(
    mut watcher: watch::Receiver<GroupSnapshot>,
    round: u32,
) -> Option<GroupSnapshot> {
    loop {
        {
            let snapshot = *watcher.borrow_and_update();
            if snapshot.round >= round && snapshot.state != GroupState::AwaitingRegistration {
                return Some(snapshot);
            }
        }

        if watcher.changed().await.is_err() {
            return None;
        }
    }
}
