//! Fan-out of server messages to connections.
//!
//! Every connection owns an unbounded outbox drained by its writer task.
//! Delivery is best effort: a closed outbox is logged and skipped. There is
//! no retry and no delivery confirmation.

use crate::registry::ConnectionId;
use log::warn;
use shared::ServerMessage;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Sending half of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Default)]
pub struct Broadcaster {
    outboxes: BTreeMap<ConnectionId, Outbox>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, id: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(id, outbox);
    }

    /// Returns false if the connection was not attached.
    pub fn detach(&mut self, id: ConnectionId) -> bool {
        self.outboxes.remove(&id).is_some()
    }

    pub fn is_attached(&self, id: ConnectionId) -> bool {
        self.outboxes.contains_key(&id)
    }

    /// Delivers `message` to every attached connection accepted by `filter`
    /// and returns how many deliveries succeeded.
    pub fn broadcast<F>(&self, filter: F, message: &ServerMessage) -> usize
    where
        F: Fn(ConnectionId) -> bool,
    {
        let mut delivered = 0;

        for (id, outbox) in &self.outboxes {
            if !filter(*id) {
                continue;
            }

            if let Err(e) = outbox.send(message.clone()) {
                warn!("Failed to broadcast to connection {}: {}", id, e);
                continue;
            }
            delivered += 1;
        }

        delivered
    }
}
