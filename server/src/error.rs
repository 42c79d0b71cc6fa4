//! Error types for the session core and its collaborators.
//!
//! None of these are fatal. The connection handler logs them and answers the
//! offending client with the error text.

use crate::groups::GroupId;
use crate::registry::ConnectionId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("connection {0} is not known to the session")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} has not logged in")]
    NotAuthenticated(ConnectionId),
    #[error("connection {0} is already logged in as {1}")]
    AlreadyAuthenticated(ConnectionId, String),
    #[error("username {0} is already in use")]
    UsernameInUse(String),
    #[error("group {0} does not exist")]
    UnknownGroup(GroupId),
    #[error("{username} is not a member of group {group_id}")]
    NotAMember { group_id: GroupId, username: String },
    #[error("{0} is watching as a viewer")]
    Viewer(String),
    #[error("group {0} is not playing a round")]
    NotPlaying(GroupId),
    #[error("group {0} has not finished its round")]
    NotAwaitingReplay(GroupId),
    #[error("group {0} is waiting for everyone to agree to play again")]
    ReplayPending(GroupId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("usernames must be non-empty and contain no spaces, commas or colons")]
    InvalidUsername,
    #[error("passwords must not be empty")]
    EmptyPassword,
    #[error("username {0} is already registered")]
    UsernameTaken(String),
    #[error("invalid username or password")]
    InvalidCredentials,
}

#[derive(Debug, Error)]
pub enum WordBankError {
    #[error("failed to read word list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("word list {0} contains no usable words")]
    Empty(PathBuf),
}
