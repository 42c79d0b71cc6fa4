//! # Typing Race Client Library
//!
//! Terminal client for the typing race server. It relays what the user types
//! to the server and prints what the server sends back, until a round starts.
//! During a round it runs the race locally: every word is shown with its time
//! limit, answers are checked as they are typed, and progress plus the final
//! score are reported to the server.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Round state for one race:
//! - Case-insensitive answer checking
//! - Per-word time limits that shrink as the round goes on
//! - Correct count, missed words and average typing time
//!
//! ### Input Module (`input`)
//! Decides what each event means. Server lines and typed lines go in, lines
//! to send and text to print come out. It keeps no I/O handles, so the
//! whole flow can be exercised in tests.
//!
//! ### Network Module (`network`)
//! Owns the TCP connection and stdin, and multiplexes them with the current
//! word's deadline in one `select!` loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:1234").await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
