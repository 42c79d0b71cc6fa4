//! Per-connection line handler.
//!
//! Each TCP connection gets a [`ConnectionHandler`] that walks the client
//! through the account dialogue and then translates protocol commands into
//! orchestrator calls. Every reply, including the handler's own prompts,
//! travels through the connection's outbox so it stays ordered with the
//! notifications other connections trigger.

use crate::auth::UserStore;
use crate::broadcast::Outbox;
use crate::registry::ConnectionId;
use crate::session::{
    Confirmation, ReplayOutcome, ScoreOutcome, SessionOrchestrator, YesOutcome,
};
use log::{debug, info, warn};
use shared::{ClientCommand, ServerMessage};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const GREETING: &str =
    "Welcome! Do you have an account? (yes/no) If you have an account then write login to login.";
const PLAY_PROMPT: &str = "Do you want to play the game? (yes/no)";
const LOGIN_FAILED: &str = "Login failed. Connection will close.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    Menu,
    RegisterUsername,
    RegisterPassword { username: String },
    LoginUsername,
    LoginPassword { username: String },
    Lobby { username: String },
}

pub struct ConnectionHandler {
    id: ConnectionId,
    session: Arc<SessionOrchestrator>,
    users: Arc<UserStore>,
    outbox: Outbox,
    stage: Stage,
}

impl ConnectionHandler {
    pub fn new(
        id: ConnectionId,
        session: Arc<SessionOrchestrator>,
        users: Arc<UserStore>,
        outbox: Outbox,
    ) -> Self {
        Self {
            id,
            session,
            users,
            outbox,
            stage: Stage::Menu,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Username once the connection has logged in.
    pub fn username(&self) -> Option<&str> {
        match &self.stage {
            Stage::Lobby { username } => Some(username),
            _ => None,
        }
    }

    pub fn greet(&self) {
        self.reply(GREETING);
    }

    fn reply(&self, text: impl Into<String>) {
        if self.outbox.send(ServerMessage::text(text)).is_err() {
            debug!("Connection {} outbox closed", self.id);
        }
    }

    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let input = line.trim();
        let stage = std::mem::replace(&mut self.stage, Stage::Menu);

        let (next, flow) = match stage {
            Stage::Menu => (self.menu(input), Flow::Continue),
            Stage::RegisterUsername => {
                self.reply("Please register. Enter password:");
                (
                    Stage::RegisterPassword {
                        username: input.to_string(),
                    },
                    Flow::Continue,
                )
            }
            Stage::RegisterPassword { username } => {
                self.register(&username, input).await;
                (Stage::Menu, Flow::Continue)
            }
            Stage::LoginUsername => {
                self.reply("Please login. Enter password:");
                (
                    Stage::LoginPassword {
                        username: input.to_string(),
                    },
                    Flow::Continue,
                )
            }
            Stage::LoginPassword { username } => {
                if self.login(&username, input).await {
                    (Stage::Lobby { username }, Flow::Continue)
                } else {
                    (Stage::Menu, Flow::Close)
                }
            }
            Stage::Lobby { username } => {
                self.lobby(&username, input).await;
                (Stage::Lobby { username }, Flow::Continue)
            }
        };

        self.stage = next;
        flow
    }

    fn menu(&self, input: &str) -> Stage {
        if input.eq_ignore_ascii_case("no") {
            self.reply("Please register. Enter username:");
            Stage::RegisterUsername
        } else if input.eq_ignore_ascii_case("login") || input.eq_ignore_ascii_case("yes") {
            self.reply("Please login. Enter username:");
            Stage::LoginUsername
        } else {
            self.reply(GREETING);
            Stage::Menu
        }
    }

    async fn register(&self, username: &str, password: &str) {
        match self.users.register(username, password).await {
            Ok(()) => self.reply("Type login to Login."),
            Err(e) => {
                warn!("Registration on connection {} failed: {}", self.id, e);
                self.reply(format!("Registration failed: {}", e));
                self.reply(GREETING);
            }
        }
    }

    async fn login(&self, username: &str, password: &str) -> bool {
        if let Err(e) = self.users.verify(username, password).await {
            info!("Login for {} on connection {} failed: {}", username, self.id, e);
            self.reply(LOGIN_FAILED);
            return false;
        }

        match self.session.on_authenticated(self.id, username).await {
            Ok(group_id) => {
                self.reply(format!("Login successful. Your username is: {}", username));
                self.reply(format!("You have been placed in group {}.", group_id));
                self.reply(PLAY_PROMPT);
                true
            }
            Err(e) => {
                self.reply(format!("{}.", capitalize(&e.to_string())));
                self.reply(LOGIN_FAILED);
                false
            }
        }
    }

    async fn lobby(&self, username: &str, input: &str) {
        let command = match input.parse::<ClientCommand>() {
            Ok(command) => command,
            Err(e) => {
                debug!("{} sent an unparseable line: {}", username, e);
                self.reply(format!("Unrecognized input ({}).", e));
                return;
            }
        };

        match command {
            ClientCommand::Yes | ClientCommand::Ready => match self.session.on_yes(self.id).await {
                Ok(YesOutcome::Confirmed(confirmation)) => self.confirmed(confirmation),
                Ok(YesOutcome::Replay(outcome)) => self.voted(outcome),
                Err(e) => self.reply(format!("Cannot start yet: {}", e)),
            },
            ClientCommand::No => self.reply("You chose not to play the game."),
            ClientCommand::Login => {
                self.reply(format!("You are already logged in as {}.", username));
            }
            ClientCommand::Score(score) => {
                match self.session.on_score_report(self.id, score).await {
                    Ok(ScoreOutcome::Recorded) | Ok(ScoreOutcome::RoundComplete(_)) => {
                        self.reply(format!("Score received: {}", score));
                    }
                    Err(e) => self.reply(format!("Score rejected: {}", e)),
                }
            }
            ClientCommand::Progress { word, performance } => {
                if let Err(e) = self.session.on_progress(self.id, &word, &performance).await {
                    self.reply(format!("Progress rejected: {}", e));
                }
            }
            ClientCommand::Quit => match self.session.on_quit(self.id).await {
                Ok(_) => self.reply("You have quit the game. You will remain as a viewer."),
                Err(e) => self.reply(format!("Quit rejected: {}", e)),
            },
            ClientCommand::PlayAgain => self.play_again().await,
        }
    }

    fn confirmed(&self, confirmation: Confirmation) {
        match confirmation {
            Confirmation::Waiting { .. } => self.reply("Waiting for other players to join..."),
            Confirmation::Released(_) => {}
            Confirmation::AlreadyPlaying => self.reply("Your group is already playing."),
        }
    }

    fn voted(&self, outcome: ReplayOutcome) {
        match outcome {
            ReplayOutcome::Pending { votes, required } => self.reply(format!(
                "Waiting for everyone to agree to play again ({}/{}).",
                votes, required
            )),
            ReplayOutcome::Reset(_) => {}
        }
    }

    async fn play_again(&self) {
        match self.session.on_replay_request(self.id).await {
            Ok(outcome) => self.voted(outcome),
            Err(e) => self.reply(format!("Cannot play again yet: {}", e)),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Drains `outbox` into `writer`, one message per line.
pub async fn write_lines<W>(
    mut writer: W,
    mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbox.recv().await {
        let line = format!("{}\n", message);
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

/// Runs one client connection to completion.
pub async fn serve(stream: TcpStream, session: Arc<SessionOrchestrator>, users: Arc<UserStore>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string());
    let (reader, writer) = stream.into_split();

    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_lines(writer, rx));

    let id = session.register_connection(tx.clone()).await;
    info!("Connection {} opened from {}", id, peer);

    let mut handler = ConnectionHandler::new(id, Arc::clone(&session), users, tx);
    handler.greet();

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("Connection {} sent: {}", id, line);
                if handler.handle_line(&line).await == Flow::Close {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading from connection {}: {}", id, e);
                break;
            }
        }
    }

    session.on_disconnect(id).await;
    drop(handler);

    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Connection {} writer stopped: {}", id, e),
        Err(e) => warn!("Connection {} writer task failed: {}", id, e),
    }
    info!("Connection {} from {} closed", id, peer);
}
