//! # Typing Race Server Library
//!
//! This library provides the server side of a multiplayer typing race. Clients
//! connect over TCP, log in, and are placed into fixed-size groups. Once every
//! member of a full group confirms, the group races on a shared list of words;
//! the server collects each player's final score, announces the winner, and
//! waits for players to agree to play again.
//!
//! ## Core Responsibilities
//!
//! ### Group Allocation
//! Authenticated connections are placed into the first group with a free
//! slot, in arrival order. A group that reaches capacity stops accepting
//! members and waits for its registrations.
//!
//! ### Round Coordination
//! Two barriers gate every round:
//! - The registration barrier releases a full group once all connected
//!   members confirmed intent to play
//! - The play-again barrier re-arms groups once the electorate agrees to
//!   another round (server-wide or per group, see [`config::ReplayScope`])
//!
//! ### Scoring
//! Each group keeps a score table for the current round. The round completes
//! when every active member has reported, and the highest score wins. Ties go
//! to the first reported maximum unless configured otherwise.
//!
//! ### Broadcasting
//! Round starts, live updates, winner announcements and prompts are pushed
//! to connection outboxes. Delivery is best effort: a closed outbox is logged
//! and skipped.
//!
//! ## Architecture Design
//!
//! ### One Lock, Many Tasks
//! Every connection runs on its own tokio task. All shared tables live inside
//! [`session::SessionOrchestrator`] behind a single async mutex, so each
//! compound operation (allocate, confirm and release, report and complete,
//! vote and reset) is atomic with respect to the others.
//!
//! ### Line Protocol
//! Messages are newline-terminated text lines, defined in the `shared` crate.
//! Each connection has an unbounded outbox drained by a writer task, keeping
//! replies and broadcasts in order per connection.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Per-connection player records: username, group, status and the round
//! flags the barriers read.
//!
//! ### Groups Module (`groups`)
//! Group table, allocation, state machine and snapshot channels.
//!
//! ### Barrier and Replay Modules (`barrier`, `replay`)
//! Predicates behind the registration and play-again barriers.
//!
//! ### Scoring Module (`scoring`)
//! Round score tables and winner selection.
//!
//! ### Broadcast Module (`broadcast`)
//! Outbox registry and filtered fan-out.
//!
//! ### Session Module (`session`)
//! The orchestrator tying the tables together.
//!
//! ### Connection and Network Modules (`connection`, `network`)
//! The per-connection account dialogue and command dispatch, and the TCP
//! accept loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::SessionConfig;
//! use server::network::Server;
//! use server::words::WordBank;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Groups of three racing on the built-in word list
//!     let server = Server::bind(
//!         "127.0.0.1:1234",
//!         SessionConfig::with_group_size(3),
//!         WordBank::builtin(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod barrier;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod error;
pub mod groups;
pub mod network;
pub mod registry;
pub mod replay;
pub mod scoring;
pub mod session;
pub mod words;
