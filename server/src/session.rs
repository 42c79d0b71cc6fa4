//! Session orchestration core.
//!
//! [`SessionOrchestrator`] owns every piece of shared game state: the player
//! registry, the group table with its round score tables, and the outboxes
//! used for broadcasting. All of it sits behind a single async mutex, and each
//! public operation is one compound read-check-write performed while holding
//! it. That makes allocation, barrier release, round completion and replay
//! consensus atomic with respect to each other no matter how many connection
//! tasks call in concurrently.
//!
//! The orchestrator has no task of its own. It runs on whichever connection
//! task triggered the event and pushes any resulting notifications into the
//! affected connections' outboxes before returning.

use crate::barrier;
use crate::broadcast::{Broadcaster, Outbox};
use crate::config::{ReplayScope, SessionConfig};
use crate::error::SessionError;
use crate::groups::{GroupId, GroupSnapshot, GroupState, GroupTable};
use crate::registry::{ConnectionId, Player, PlayerStatus, Registry};
use crate::replay;
use crate::scoring::{select_winner, Winner};
use crate::words::WordBank;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::ServerMessage;
use tokio::sync::{watch, Mutex};

const REARM_PROMPT: &str = "A new round is ready. Do you want to play the game? (yes/no)";

/// Outcome of confirming intent to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Still waiting on `pending` players, counting open slots in a group
    /// that is not full yet.
    Waiting { pending: usize },
    /// This confirmation released the group into a new round.
    Released(GroupId),
    /// The group is already playing.
    AlreadyPlaying,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreOutcome {
    Recorded,
    /// Every active member has reported. `None` when nobody active was left
    /// to win.
    RoundComplete(Option<Winner>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    Pending { votes: usize, required: usize },
    /// Consensus reached; these groups were re-armed for registration.
    Reset(Vec<GroupId>),
}

/// What a `yes` from a logged-in player turned out to mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YesOutcome {
    Confirmed(Confirmation),
    Replay(ReplayOutcome),
}

/// Read-only view of a group for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub id: GroupId,
    pub state: GroupState,
    pub round: u32,
    pub members: Vec<String>,
}

struct SessionState {
    config: SessionConfig,
    registry: Registry,
    groups: GroupTable,
    broadcaster: Broadcaster,
    words: WordBank,
    rng: StdRng,
    next_connection_id: u64,
}

pub struct SessionOrchestrator {
    state: Mutex<SessionState>,
}

fn logged<T>(operation: &str, result: Result<T, SessionError>) -> Result<T, SessionError> {
    if let Err(e) = &result {
        warn!("{} rejected: {}", operation, e);
    }
    result
}

impl SessionOrchestrator {
    pub fn new(config: SessionConfig, words: WordBank) -> Self {
        Self::with_rng(config, words, StdRng::from_entropy())
    }

    /// Builds an orchestrator with a caller-provided random source, which
    /// makes word draws reproducible.
    pub fn with_rng(config: SessionConfig, words: WordBank, rng: StdRng) -> Self {
        let groups = GroupTable::new(config.group_size);
        info!(
            "Session configured: group size {}, {:?} replay consensus, {:?} tie-break",
            groups.capacity(),
            config.replay_scope,
            config.tie_break
        );

        Self {
            state: Mutex::new(SessionState {
                config,
                registry: Registry::new(),
                groups,
                broadcaster: Broadcaster::new(),
                words,
                rng,
                next_connection_id: 0,
            }),
        }
    }

    /// Attaches a new connection's outbox and assigns its id.
    pub async fn register_connection(&self, outbox: Outbox) -> ConnectionId {
        let mut state = self.state.lock().await;
        state.next_connection_id += 1;
        let id = ConnectionId(state.next_connection_id);
        state.broadcaster.attach(id, outbox);
        debug!("Connection {} attached", id);
        id
    }

    /// Places a freshly authenticated connection into a group.
    pub async fn on_authenticated(
        &self,
        connection: ConnectionId,
        username: &str,
    ) -> Result<GroupId, SessionError> {
        let mut state = self.state.lock().await;
        logged("Authentication", state.authenticate(connection, username))
    }

    pub async fn on_confirm_play(
        &self,
        connection: ConnectionId,
    ) -> Result<Confirmation, SessionError> {
        let mut state = self.state.lock().await;
        logged("Play confirmation", state.confirm_registration(connection))
    }

    /// Records `score` for the player on `connection` in its group's table.
    pub async fn on_score_report(
        &self,
        connection: ConnectionId,
        score: u32,
    ) -> Result<ScoreOutcome, SessionError> {
        let mut state = self.state.lock().await;
        let reporter = state
            .player(connection)
            .map(|player| (player.group_id, player.username.clone()));
        let result = match reporter {
            Ok((group_id, username)) => state.report_score(group_id, &username, score),
            Err(e) => Err(e),
        };
        logged("Score report", result)
    }

    /// Upserts a score for `username` in `group_id`.
    pub async fn report_score(
        &self,
        group_id: GroupId,
        username: &str,
        score: u32,
    ) -> Result<ScoreOutcome, SessionError> {
        let mut state = self.state.lock().await;
        logged("Score report", state.report_score(group_id, username, score))
    }

    /// Sends a live round update to the reporting player's group and returns
    /// how many connections received it.
    pub async fn on_progress(
        &self,
        connection: ConnectionId,
        word: &str,
        performance: &str,
    ) -> Result<usize, SessionError> {
        let state = self.state.lock().await;
        logged("Progress update", state.progress(connection, word, performance))
    }

    /// Moves the player to viewer status. Returns the score outcome when a
    /// round was in progress.
    pub async fn on_quit(
        &self,
        connection: ConnectionId,
    ) -> Result<Option<ScoreOutcome>, SessionError> {
        let mut state = self.state.lock().await;
        logged("Quit", state.quit(connection))
    }

    /// Treats `yes` as a replay vote while one is open to this player and as
    /// a play confirmation otherwise, deciding under the same lock.
    pub async fn on_yes(&self, connection: ConnectionId) -> Result<YesOutcome, SessionError> {
        let mut state = self.state.lock().await;
        let result = match state.replay_vote_open_to(connection) {
            Ok(true) => state.request_replay(connection).map(YesOutcome::Replay),
            Ok(false) => state
                .confirm_registration(connection)
                .map(YesOutcome::Confirmed),
            Err(e) => Err(e),
        };
        logged("Yes", result)
    }

    pub async fn on_replay_request(
        &self,
        connection: ConnectionId,
    ) -> Result<ReplayOutcome, SessionError> {
        let mut state = self.state.lock().await;
        logged("Replay request", state.request_replay(connection))
    }

    pub async fn on_disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.lock().await;
        state.disconnect(connection);
    }

    pub async fn group_of(&self, connection: ConnectionId) -> Option<GroupId> {
        let state = self.state.lock().await;
        state.registry.get(connection).map(|player| player.group_id)
    }

    pub async fn group_state_of(&self, connection: ConnectionId) -> Option<GroupState> {
        let state = self.state.lock().await;
        let group_id = state.registry.get(connection)?.group_id;
        state.groups.get(group_id).map(|group| group.state())
    }

    pub async fn subscribe(&self, group_id: GroupId) -> Option<watch::Receiver<GroupSnapshot>> {
        let state = self.state.lock().await;
        state.groups.get(group_id).map(|group| group.subscribe())
    }

    /// Waits until `group_id` has been released for round `round` or later.
    pub async fn wait_for_round(&self, group_id: GroupId, round: u32) -> Option<GroupSnapshot> {
        let watcher = self.subscribe(group_id).await?;
        barrier::wait_for_round(watcher, round).await
    }

    /// Current round scores of a group, in report order.
    pub async fn round_scores(&self, group_id: GroupId) -> Option<Vec<(String, u32)>> {
        let state = self.state.lock().await;
        state.groups.get(group_id).map(|group| {
            group
                .scores()
                .iter()
                .map(|(name, score)| (name.to_string(), score))
                .collect()
        })
    }

    pub async fn player_status(&self, connection: ConnectionId) -> Option<PlayerStatus> {
        let state = self.state.lock().await;
        state.registry.get(connection).map(|player| player.status)
    }

    pub async fn groups_overview(&self) -> Vec<GroupSummary> {
        let state = self.state.lock().await;
        state
            .groups
            .iter()
            .map(|group| GroupSummary {
                id: group.id(),
                state: group.state(),
                round: group.round(),
                members: group
                    .members()
                    .iter()
                    .filter_map(|id| state.registry.get(*id))
                    .map(|player| player.username.clone())
                    .collect(),
            })
            .collect()
    }

    pub async fn connected_players(&self) -> usize {
        let state = self.state.lock().await;
        state.registry.connected().count()
    }
}

impl SessionState {
    fn player(&self, connection: ConnectionId) -> Result<&Player, SessionError> {
        match self.registry.get(connection) {
            Some(player) if player.is_connected() => Ok(player),
            Some(_) => Err(SessionError::UnknownConnection(connection)),
            None if self.broadcaster.is_attached(connection) => {
                Err(SessionError::NotAuthenticated(connection))
            }
            None => Err(SessionError::UnknownConnection(connection)),
        }
    }

    fn group_state(&self, group_id: GroupId) -> Result<GroupState, SessionError> {
        self.groups
            .get(group_id)
            .map(|group| group.state())
            .ok_or(SessionError::UnknownGroup(group_id))
    }

    fn notify_group(&self, group_id: GroupId, message: &ServerMessage) -> usize {
        let members = match self.groups.get(group_id) {
            Some(group) => group.members(),
            None => return 0,
        };
        self.broadcaster.broadcast(|id| members.contains(&id), message)
    }

    fn authenticate(
        &mut self,
        connection: ConnectionId,
        username: &str,
    ) -> Result<GroupId, SessionError> {
        if !self.broadcaster.is_attached(connection) {
            return Err(SessionError::UnknownConnection(connection));
        }
        if let Some(player) = self.registry.get(connection) {
            return Err(SessionError::AlreadyAuthenticated(
                connection,
                player.username.clone(),
            ));
        }
        if self.registry.find_connected(username).is_some() {
            return Err(SessionError::UsernameInUse(username.to_string()));
        }

        let placement = self.groups.allocate(connection);
        self.registry
            .insert(connection, Player::new(username.to_string(), placement.group_id));
        info!(
            "{} (connection {}) joined group {}",
            username, connection, placement.group_id
        );

        if placement.filled {
            info!(
                "Group {} is full, waiting for registrations",
                placement.group_id
            );
            self.try_release(placement.group_id);
        } else if self.config.replay_scope == ReplayScope::Global && self.any_awaiting_replay() {
            self.broadcaster
                .broadcast(|id| id == connection, &ServerMessage::ReplayPrompt);
        }

        Ok(placement.group_id)
    }

    fn confirm_registration(
        &mut self,
        connection: ConnectionId,
    ) -> Result<Confirmation, SessionError> {
        let group_id = self.player(connection)?.group_id;
        match self.group_state(group_id)? {
            GroupState::Playing => return Ok(Confirmation::AlreadyPlaying),
            GroupState::AwaitingReplay => return Err(SessionError::ReplayPending(group_id)),
            GroupState::Filling | GroupState::AwaitingRegistration => {}
        }

        if let Some(player) = self.registry.get_mut(connection) {
            player.registration_confirmed = true;
            debug!("{} confirmed intent to play", player.username);
        }

        if self.try_release(group_id) {
            return Ok(Confirmation::Released(group_id));
        }

        let pending = self
            .groups
            .get(group_id)
            .map(|group| {
                let open_slots = self.groups.capacity() - group.members().len();
                barrier::pending_confirmations(group, &self.registry).len() + open_slots
            })
            .unwrap_or(0);
        Ok(Confirmation::Waiting { pending })
    }

    /// Starts a round for `group_id` if its registration barrier is satisfied.
    fn try_release(&mut self, group_id: GroupId) -> bool {
        let ready = self
            .groups
            .get(group_id)
            .map(|group| barrier::ready_to_release(group, &self.registry))
            .unwrap_or(false);
        if !ready {
            return false;
        }

        let words = self.words.draw(self.config.words_per_round, &mut self.rng);
        let Some(group) = self.groups.get_mut(group_id) else {
            return false;
        };
        let round = group.begin_round();
        let members = group.members().to_vec();

        let mut players = Vec::with_capacity(members.len());
        for id in &members {
            if let Some(player) = self.registry.get_mut(*id) {
                if player.is_connected() {
                    player.last_score = None;
                    players.push(player.username.clone());
                }
            }
        }

        let message = ServerMessage::RoundStart {
            group_id: group_id.0,
            players,
            words,
        };
        let notified = self
            .broadcaster
            .broadcast(|id| members.contains(&id), &message);
        info!(
            "Group {} released for round {} ({} players notified)",
            group_id, round, notified
        );
        true
    }

    fn report_score(
        &mut self,
        group_id: GroupId,
        username: &str,
        score: u32,
    ) -> Result<ScoreOutcome, SessionError> {
        let group = self
            .groups
            .get(group_id)
            .ok_or(SessionError::UnknownGroup(group_id))?;

        let member = group.members().iter().copied().find(|id| {
            self.registry
                .get(*id)
                .map(|player| player.is_connected() && player.username == username)
                .unwrap_or(false)
        });
        let Some(member) = member else {
            return Err(SessionError::NotAMember {
                group_id,
                username: username.to_string(),
            });
        };
        if self.registry.get(member).map(|p| p.status) == Some(PlayerStatus::Viewer) {
            return Err(SessionError::Viewer(username.to_string()));
        }
        if group.state() != GroupState::Playing {
            return Err(SessionError::NotPlaying(group_id));
        }

        if let Some(group) = self.groups.get_mut(group_id) {
            if let Some(previous) = group.scores_mut().record(username, score) {
                debug!(
                    "{} replaced score {} with {} in group {}",
                    username, previous, score, group_id
                );
            }
        }
        if let Some(player) = self.registry.get_mut(member) {
            player.last_score = Some(score);
        }
        info!("{} scored {} in group {}", username, score, group_id);

        Ok(match self.evaluate_round(group_id) {
            Some(winner) => ScoreOutcome::RoundComplete(winner),
            None => ScoreOutcome::Recorded,
        })
    }

    /// Finishes the round once every active member has a score.
    ///
    /// Returns `Some(winner)` only on the call that completed the round.
    fn evaluate_round(&mut self, group_id: GroupId) -> Option<Option<Winner>> {
        let group = self.groups.get(group_id)?;
        if group.state() != GroupState::Playing {
            return None;
        }

        let active: Vec<&str> = group
            .members()
            .iter()
            .filter_map(|id| self.registry.get(*id))
            .filter(|player| player.is_active())
            .map(|player| player.username.as_str())
            .collect();

        if !active.iter().all(|name| group.scores().contains(name)) {
            return None;
        }

        let winner = select_winner(
            group
                .scores()
                .iter()
                .filter(|(name, _)| active.contains(name)),
            self.config.tie_break,
        );

        if let Some(group) = self.groups.get_mut(group_id) {
            group.transition(GroupState::AwaitingReplay);
        }

        let announcement = match &winner {
            Some(winner) => {
                info!(
                    "Group {} winner: {} with {}",
                    group_id, winner.username, winner.score
                );
                ServerMessage::Winner {
                    username: winner.username.clone(),
                    score: winner.score,
                }
            }
            None => {
                info!("Group {} finished without an active player", group_id);
                ServerMessage::NoWinner
            }
        };
        let audience = self.replay_audience(group_id);
        self.broadcaster
            .broadcast(|id| audience.contains(&id), &announcement);
        self.broadcaster
            .broadcast(|id| audience.contains(&id), &ServerMessage::ReplayPrompt);

        Some(winner)
    }

    /// Connections asked to vote when `group_id` finishes a round: the group
    /// itself, plus under global consensus everyone waiting in a group that
    /// has not filled, since their votes count too.
    fn replay_audience(&self, group_id: GroupId) -> Vec<ConnectionId> {
        self.groups
            .iter()
            .filter(|group| {
                group.id() == group_id
                    || (self.config.replay_scope == ReplayScope::Global
                        && group.state() == GroupState::Filling)
            })
            .flat_map(|group| group.members().iter().copied())
            .collect()
    }

    fn any_awaiting_replay(&self) -> bool {
        self.groups
            .iter()
            .any(|group| group.state() == GroupState::AwaitingReplay)
    }

    /// Whether a `yes` from `connection` is a replay vote: its group finished
    /// a round, or under global consensus its group is still filling while
    /// another group waits on the vote.
    fn replay_vote_open_to(&self, connection: ConnectionId) -> Result<bool, SessionError> {
        let group_id = self.player(connection)?.group_id;
        Ok(match self.group_state(group_id)? {
            GroupState::AwaitingReplay => true,
            GroupState::Filling => {
                self.config.replay_scope == ReplayScope::Global && self.any_awaiting_replay()
            }
            GroupState::AwaitingRegistration | GroupState::Playing => false,
        })
    }

    fn progress(
        &self,
        connection: ConnectionId,
        word: &str,
        performance: &str,
    ) -> Result<usize, SessionError> {
        let player = self.player(connection)?;
        let group_id = player.group_id;
        let group = self
            .groups
            .get(group_id)
            .ok_or(SessionError::UnknownGroup(group_id))?;
        if group.state() != GroupState::Playing {
            return Err(SessionError::NotPlaying(group_id));
        }

        let live_scores = group
            .members()
            .iter()
            .filter_map(|id| self.registry.get(*id))
            .filter_map(|member| {
                group
                    .scores()
                    .get(&member.username)
                    .map(|score| (member.username.clone(), score))
            })
            .collect();

        let performance = if performance.is_empty() {
            player.username.clone()
        } else {
            format!("{} {}", player.username, performance)
        };
        let update = ServerMessage::Update {
            word: word.to_string(),
            performance,
            live_scores,
        };

        Ok(self.notify_group(group_id, &update))
    }

    fn quit(&mut self, connection: ConnectionId) -> Result<Option<ScoreOutcome>, SessionError> {
        let player = self.player(connection)?;
        if player.status == PlayerStatus::Viewer {
            return Ok(None);
        }
        let group_id = player.group_id;
        let username = player.username.clone();

        if let Some(player) = self.registry.get_mut(connection) {
            player.status = PlayerStatus::Viewer;
        }
        info!("{} quit and is now a viewer", username);

        if self.group_state(group_id)? != GroupState::Playing {
            return Ok(None);
        }

        self.record_forfeit(connection, group_id, &username);
        Ok(Some(match self.evaluate_round(group_id) {
            Some(winner) => ScoreOutcome::RoundComplete(winner),
            None => ScoreOutcome::Recorded,
        }))
    }

    /// Records a zero for a player leaving mid-round without a score.
    fn record_forfeit(&mut self, connection: ConnectionId, group_id: GroupId, username: &str) {
        let Some(group) = self.groups.get_mut(group_id) else {
            return;
        };
        if group.scores().contains(username) {
            return;
        }
        group.scores_mut().record(username, 0);
        if let Some(player) = self.registry.get_mut(connection) {
            player.last_score = Some(0);
        }
    }

    fn request_replay(&mut self, connection: ConnectionId) -> Result<ReplayOutcome, SessionError> {
        let group_id = self.player(connection)?.group_id;
        let scope = self.config.replay_scope;
        if !replay::can_vote(scope, self.group_state(group_id)?) {
            return Err(SessionError::NotAwaitingReplay(group_id));
        }

        if let Some(player) = self.registry.get_mut(connection) {
            player.play_again_requested = true;
            debug!("{} wants to play again", player.username);
        }

        if replay::consensus_reached(scope, group_id, &self.groups, &self.registry) {
            return Ok(ReplayOutcome::Reset(self.reset(group_id)));
        }

        let (votes, required) = replay::tally(scope, group_id, &self.groups, &self.registry);
        info!("Replay votes: {}/{}", votes, required);
        Ok(ReplayOutcome::Pending { votes, required })
    }

    /// Clears round state and re-arms the registration barrier.
    fn reset(&mut self, group_id: GroupId) -> Vec<GroupId> {
        let scope = self.config.replay_scope;
        let targets = replay::groups_to_reset(scope, group_id, &self.groups);

        let filling: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|group| group.state() == GroupState::Filling)
            .map(|group| group.id())
            .collect();

        for (_, player) in self.registry.iter_mut() {
            if filling.contains(&player.group_id) {
                // Still waiting for members; keep any confirmation to play.
                player.play_again_requested = false;
            } else if scope == ReplayScope::Global || player.group_id == group_id {
                player.reset_round();
            }
        }

        let prompt = ServerMessage::text(REARM_PROMPT);
        for target in &targets {
            if let Some(group) = self.groups.get_mut(*target) {
                group.scores_mut().clear();
                group.transition(GroupState::AwaitingRegistration);
            }
            self.notify_group(*target, &prompt);
        }

        info!("Replay consensus reached, re-armed groups {:?}", targets);
        targets
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        self.broadcaster.detach(connection);

        let Some(player) = self.registry.get_mut(connection) else {
            debug!("Unauthenticated connection {} closed", connection);
            return;
        };
        if !player.is_connected() {
            return;
        }

        let was_active = player.is_active();
        player.status = PlayerStatus::Disconnected;
        let group_id = player.group_id;
        let username = player.username.clone();
        info!("{} (connection {}) disconnected", username, connection);

        match self.group_state(group_id) {
            Ok(GroupState::AwaitingRegistration) => {
                self.try_release(group_id);
            }
            Ok(GroupState::Playing) => {
                if was_active {
                    self.record_forfeit(connection, group_id, &username);
                }
                self.evaluate_round(group_id);
            }
            _ => {}
        }

        let scope = self.config.replay_scope;
        let votable = self
            .group_state(group_id)
            .map(|state| replay::can_vote(scope, state))
            .unwrap_or(false);
        if votable && replay::consensus_reached(scope, group_id, &self.groups, &self.registry) {
            self.reset(group_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TieBreak;
    use tokio::sync::mpsc;
    use tokio_test::{assert_pending, assert_ready, task};

    type Inbox = mpsc::UnboundedReceiver<ServerMessage>;

    fn orchestrator(config: SessionConfig) -> SessionOrchestrator {
        SessionOrchestrator::with_rng(config, WordBank::builtin(), StdRng::seed_from_u64(42))
    }

    async fn connect(session: &SessionOrchestrator) -> (ConnectionId, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (session.register_connection(tx).await, rx)
    }

    async fn join(session: &SessionOrchestrator, names: &[&str]) -> Vec<(ConnectionId, Inbox)> {
        let mut joined = Vec::new();
        for name in names {
            let (id, rx) = connect(session).await;
            session.on_authenticated(id, name).await.unwrap();
            joined.push((id, rx));
        }
        joined
    }

    async fn start_round(session: &SessionOrchestrator, players: &[(ConnectionId, Inbox)]) {
        for (id, _) in players {
            session.on_confirm_play(*id).await.unwrap();
        }
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn round_starts(messages: &[ServerMessage]) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::RoundStart { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_connections_fill_groups_in_order() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let players = join(&session, &["x", "y", "z", "w"]).await;

        assert_eq!(session.group_of(players[0].0).await, Some(GroupId(1)));
        assert_eq!(session.group_of(players[2].0).await, Some(GroupId(1)));
        assert_eq!(session.group_of(players[3].0).await, Some(GroupId(2)));

        let overview = session.groups_overview().await;
        assert_eq!(overview.len(), 2);
        assert_eq!(overview[0].state, GroupState::AwaitingRegistration);
        assert_eq!(overview[0].members, vec!["x", "y", "z"]);
        assert_eq!(overview[1].state, GroupState::Filling);
        assert_eq!(overview[1].members, vec!["w"]);
    }

    #[tokio::test]
    async fn test_authentication_errors() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let (first, _rx1) = connect(&session).await;
        let (second, _rx2) = connect(&session).await;

        session.on_authenticated(first, "alice").await.unwrap();

        assert_eq!(
            session.on_authenticated(second, "alice").await,
            Err(SessionError::UsernameInUse("alice".to_string()))
        );
        assert_eq!(
            session.on_authenticated(first, "again").await,
            Err(SessionError::AlreadyAuthenticated(first, "alice".to_string()))
        );
        assert_eq!(
            session.on_confirm_play(second).await,
            Err(SessionError::NotAuthenticated(second))
        );
        assert_eq!(
            session.on_authenticated(ConnectionId(99), "ghost").await,
            Err(SessionError::UnknownConnection(ConnectionId(99)))
        );
    }

    #[tokio::test]
    async fn test_barrier_releases_once_when_all_confirm() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let mut players = join(&session, &["x", "y", "z"]).await;

        assert_eq!(
            session.on_confirm_play(players[2].0).await,
            Ok(Confirmation::Waiting { pending: 2 })
        );
        assert_eq!(
            session.on_confirm_play(players[0].0).await,
            Ok(Confirmation::Waiting { pending: 1 })
        );
        assert_eq!(
            session.on_confirm_play(players[0].0).await,
            Ok(Confirmation::Waiting { pending: 1 })
        );
        assert_eq!(
            session.on_confirm_play(players[1].0).await,
            Ok(Confirmation::Released(GroupId(1)))
        );
        assert_eq!(
            session.on_confirm_play(players[1].0).await,
            Ok(Confirmation::AlreadyPlaying)
        );

        for (_, rx) in players.iter_mut() {
            let messages = drain(rx);
            assert_eq!(round_starts(&messages), 1);
            match &messages[0] {
                ServerMessage::RoundStart {
                    group_id,
                    players,
                    words,
                } => {
                    assert_eq!(*group_id, 1);
                    assert_eq!(players, &vec!["x", "y", "z"]);
                    assert_eq!(words.len(), 20);
                }
                other => panic!("Unexpected message {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_early_confirmations_release_when_group_fills() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let (first, mut rx1) = connect(&session).await;
        session.on_authenticated(first, "early").await.unwrap();

        assert_eq!(
            session.on_confirm_play(first).await,
            Ok(Confirmation::Waiting { pending: 1 })
        );

        let (second, mut rx2) = connect(&session).await;
        session.on_authenticated(second, "late").await.unwrap();
        assert_eq!(
            session.on_confirm_play(second).await,
            Ok(Confirmation::Released(GroupId(1)))
        );
        assert_eq!(round_starts(&drain(&mut rx1)), 1);
        assert_eq!(round_starts(&drain(&mut rx2)), 1);
    }

    #[tokio::test]
    async fn test_first_reported_maximum_wins() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let players = join(&session, &["A", "B", "C"]).await;
        start_round(&session, &players).await;

        assert_eq!(session.on_score_report(players[0].0, 5).await, Ok(ScoreOutcome::Recorded));
        assert_eq!(session.on_score_report(players[1].0, 9).await, Ok(ScoreOutcome::Recorded));
        assert_eq!(
            session.on_score_report(players[2].0, 9).await,
            Ok(ScoreOutcome::RoundComplete(Some(Winner {
                username: "B".to_string(),
                score: 9,
            })))
        );
    }

    #[tokio::test]
    async fn test_lexicographic_tie_break_is_configurable() {
        let config = SessionConfig {
            tie_break: TieBreak::Lexicographic,
            ..SessionConfig::with_group_size(2)
        };
        let session = orchestrator(config);
        let players = join(&session, &["zed", "amy"]).await;
        start_round(&session, &players).await;

        session.on_score_report(players[0].0, 4).await.unwrap();
        let outcome = session.on_score_report(players[1].0, 4).await.unwrap();

        assert_eq!(
            outcome,
            ScoreOutcome::RoundComplete(Some(Winner {
                username: "amy".to_string(),
                score: 4,
            }))
        );
    }

    #[tokio::test]
    async fn test_repeated_report_overwrites() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b"]).await;
        start_round(&session, &players).await;

        session.on_score_report(players[0].0, 3).await.unwrap();
        session.on_score_report(players[0].0, 8).await.unwrap();

        assert_eq!(
            session.round_scores(GroupId(1)).await,
            Some(vec![("a".to_string(), 8)])
        );
    }

    #[tokio::test]
    async fn test_non_member_score_is_rejected() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b", "c"]).await;
        start_round(&session, &players[..2]).await;
        session.on_score_report(players[0].0, 1).await.unwrap();

        assert_eq!(
            session.report_score(GroupId(1), "c", 50).await,
            Err(SessionError::NotAMember {
                group_id: GroupId(1),
                username: "c".to_string(),
            })
        );
        assert_eq!(
            session.report_score(GroupId(1), "stranger", 50).await,
            Err(SessionError::NotAMember {
                group_id: GroupId(1),
                username: "stranger".to_string(),
            })
        );
        assert_eq!(
            session.report_score(GroupId(7), "a", 50).await,
            Err(SessionError::UnknownGroup(GroupId(7)))
        );
        assert_eq!(
            session.round_scores(GroupId(1)).await,
            Some(vec![("a".to_string(), 1)])
        );
        assert_eq!(
            session.group_state_of(players[0].0).await,
            Some(GroupState::Playing)
        );
    }

    #[tokio::test]
    async fn test_scores_outside_a_round_are_rejected() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b"]).await;

        assert_eq!(
            session.on_score_report(players[0].0, 1).await,
            Err(SessionError::NotPlaying(GroupId(1)))
        );
    }

    #[tokio::test]
    async fn test_quit_records_zero_and_shrinks_completeness() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let players = join(&session, &["x", "y", "z"]).await;
        start_round(&session, &players).await;

        assert_eq!(
            session.on_quit(players[0].0).await,
            Ok(Some(ScoreOutcome::Recorded))
        );
        assert_eq!(session.player_status(players[0].0).await, Some(PlayerStatus::Viewer));
        assert_eq!(
            session.on_score_report(players[0].0, 30).await,
            Err(SessionError::Viewer("x".to_string()))
        );

        session.on_score_report(players[1].0, 0).await.unwrap();
        let outcome = session.on_score_report(players[2].0, 0).await.unwrap();

        // The quitter's zero was recorded first but viewers cannot win.
        assert_eq!(
            outcome,
            ScoreOutcome::RoundComplete(Some(Winner {
                username: "y".to_string(),
                score: 0,
            }))
        );
        assert_eq!(
            session.round_scores(GroupId(1)).await,
            Some(vec![
                ("x".to_string(), 0),
                ("y".to_string(), 0),
                ("z".to_string(), 0),
            ])
        );
    }

    #[tokio::test]
    async fn test_quit_after_reporting_keeps_score() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b"]).await;
        start_round(&session, &players).await;

        session.on_score_report(players[0].0, 6).await.unwrap();
        session.on_quit(players[0].0).await.unwrap();

        assert_eq!(
            session.round_scores(GroupId(1)).await,
            Some(vec![("a".to_string(), 6)])
        );
        assert_eq!(session.on_quit(players[0].0).await, Ok(None));
    }

    #[tokio::test]
    async fn test_last_active_player_quitting_ends_round_without_winner() {
        let session = orchestrator(SessionConfig::with_group_size(1));
        let mut players = join(&session, &["solo"]).await;
        start_round(&session, &players).await;
        drain(&mut players[0].1);

        assert_eq!(
            session.on_quit(players[0].0).await,
            Ok(Some(ScoreOutcome::RoundComplete(None)))
        );
        assert_eq!(
            drain(&mut players[0].1),
            vec![ServerMessage::NoWinner, ServerMessage::ReplayPrompt]
        );
    }

    #[tokio::test]
    async fn test_viewer_stays_out_of_next_round_completeness() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let players = join(&session, &["x", "y", "z"]).await;
        start_round(&session, &players).await;

        session.on_quit(players[0].0).await.unwrap();
        session.on_score_report(players[1].0, 2).await.unwrap();
        session.on_score_report(players[2].0, 3).await.unwrap();
        for (id, _) in &players {
            session.on_replay_request(*id).await.unwrap();
        }
        start_round(&session, &players).await;

        session.on_score_report(players[1].0, 5).await.unwrap();
        let outcome = session.on_score_report(players[2].0, 1).await.unwrap();
        assert_eq!(
            outcome,
            ScoreOutcome::RoundComplete(Some(Winner {
                username: "y".to_string(),
                score: 5,
            }))
        );
    }

    #[tokio::test]
    async fn test_end_to_end_round_and_replay() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let mut players = join(&session, &["X", "Y", "Z"]).await;

        start_round(&session, &players).await;
        for (_, rx) in players.iter_mut() {
            assert_eq!(round_starts(&drain(rx)), 1);
        }

        session.on_score_report(players[0].0, 10).await.unwrap();
        session.on_score_report(players[1].0, 7).await.unwrap();
        let outcome = session.on_score_report(players[2].0, 10).await.unwrap();
        assert_eq!(
            outcome,
            ScoreOutcome::RoundComplete(Some(Winner {
                username: "X".to_string(),
                score: 10,
            }))
        );

        for (_, rx) in players.iter_mut() {
            assert_eq!(
                drain(rx),
                vec![
                    ServerMessage::Winner {
                        username: "X".to_string(),
                        score: 10,
                    },
                    ServerMessage::ReplayPrompt,
                ]
            );
        }

        assert_eq!(
            session.on_replay_request(players[0].0).await,
            Ok(ReplayOutcome::Pending {
                votes: 1,
                required: 3,
            })
        );
        assert_eq!(
            session.on_replay_request(players[1].0).await,
            Ok(ReplayOutcome::Pending {
                votes: 2,
                required: 3,
            })
        );
        assert_eq!(
            session.group_state_of(players[0].0).await,
            Some(GroupState::AwaitingReplay)
        );
        assert_eq!(
            session.on_replay_request(players[2].0).await,
            Ok(ReplayOutcome::Reset(vec![GroupId(1)]))
        );

        assert_eq!(session.round_scores(GroupId(1)).await, Some(vec![]));
        assert_eq!(
            session.group_state_of(players[0].0).await,
            Some(GroupState::AwaitingRegistration)
        );
        for (_, rx) in players.iter_mut() {
            assert_eq!(drain(rx), vec![ServerMessage::text(REARM_PROMPT)]);
        }

        start_round(&session, &players).await;
        assert_eq!(
            session.subscribe(GroupId(1)).await.map(|rx| *rx.borrow()),
            Some(GroupSnapshot {
                state: GroupState::Playing,
                round: 2,
            })
        );
    }

    #[tokio::test]
    async fn test_replay_not_allowed_mid_round() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b"]).await;
        start_round(&session, &players).await;

        assert_eq!(
            session.on_replay_request(players[0].0).await,
            Err(SessionError::NotAwaitingReplay(GroupId(1)))
        );
    }

    #[tokio::test]
    async fn test_confirming_before_replay_consensus_is_rejected() {
        let session = orchestrator(SessionConfig::with_group_size(1));
        let players = join(&session, &["a"]).await;
        start_round(&session, &players).await;
        session.on_score_report(players[0].0, 1).await.unwrap();

        assert_eq!(
            session.on_confirm_play(players[0].0).await,
            Err(SessionError::ReplayPending(GroupId(1)))
        );
    }

    #[tokio::test]
    async fn test_global_replay_waits_for_every_group() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b", "c", "d"]).await;
        start_round(&session, &players).await;
        for (index, (id, _)) in players.iter().enumerate() {
            session.on_score_report(*id, index as u32).await.unwrap();
        }

        session.on_replay_request(players[0].0).await.unwrap();
        assert_eq!(
            session.on_replay_request(players[1].0).await,
            Ok(ReplayOutcome::Pending {
                votes: 2,
                required: 4,
            })
        );
        assert_eq!(
            session.group_state_of(players[0].0).await,
            Some(GroupState::AwaitingReplay)
        );

        session.on_replay_request(players[2].0).await.unwrap();
        assert_eq!(
            session.on_replay_request(players[3].0).await,
            Ok(ReplayOutcome::Reset(vec![GroupId(1), GroupId(2)]))
        );
    }

    #[tokio::test]
    async fn test_global_replay_counts_players_in_unfilled_groups() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b", "c"]).await;
        start_round(&session, &players[..2]).await;
        session.on_score_report(players[0].0, 1).await.unwrap();
        session.on_score_report(players[1].0, 2).await.unwrap();

        session.on_replay_request(players[0].0).await.unwrap();
        assert_eq!(
            session.on_replay_request(players[1].0).await,
            Ok(ReplayOutcome::Pending {
                votes: 2,
                required: 3,
            })
        );
        assert_eq!(
            session.on_replay_request(players[2].0).await,
            Ok(ReplayOutcome::Reset(vec![GroupId(1)]))
        );
        assert_eq!(session.group_state_of(players[2].0).await, Some(GroupState::Filling));
    }

    #[tokio::test]
    async fn test_unfilled_group_is_asked_and_its_yes_counts_as_a_vote() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let mut players = join(&session, &["a", "b", "c"]).await;
        start_round(&session, &players[..2]).await;
        session.on_score_report(players[0].0, 1).await.unwrap();
        session.on_score_report(players[1].0, 2).await.unwrap();

        assert_eq!(
            drain(&mut players[2].1),
            vec![
                ServerMessage::Winner {
                    username: "b".to_string(),
                    score: 2,
                },
                ServerMessage::ReplayPrompt,
            ]
        );

        session.on_yes(players[0].0).await.unwrap();
        session.on_yes(players[1].0).await.unwrap();
        assert_eq!(
            session.on_yes(players[2].0).await,
            Ok(YesOutcome::Replay(ReplayOutcome::Reset(vec![GroupId(1)])))
        );
        assert_eq!(
            session.group_state_of(players[0].0).await,
            Some(GroupState::AwaitingRegistration)
        );
        assert!(drain(&mut players[2].1).is_empty());
    }

    #[tokio::test]
    async fn test_late_joiner_is_prompted_while_global_vote_is_open() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b"]).await;
        start_round(&session, &players).await;
        session.on_score_report(players[0].0, 3).await.unwrap();
        session.on_score_report(players[1].0, 1).await.unwrap();

        let mut late = join(&session, &["c"]).await;
        assert_eq!(drain(&mut late[0].1), vec![ServerMessage::ReplayPrompt]);
        assert_eq!(
            session.on_yes(late[0].0).await,
            Ok(YesOutcome::Replay(ReplayOutcome::Pending {
                votes: 1,
                required: 3,
            }))
        );
    }

    #[tokio::test]
    async fn test_yes_confirms_when_no_vote_is_open() {
        let config = SessionConfig {
            replay_scope: ReplayScope::PerGroup,
            ..SessionConfig::with_group_size(2)
        };
        let session = orchestrator(config);
        let players = join(&session, &["a", "b"]).await;
        start_round(&session, &players).await;
        session.on_score_report(players[0].0, 3).await.unwrap();
        session.on_score_report(players[1].0, 1).await.unwrap();

        let mut late = join(&session, &["c"]).await;
        assert!(drain(&mut late[0].1).is_empty());
        assert_eq!(
            session.on_yes(late[0].0).await,
            Ok(YesOutcome::Confirmed(Confirmation::Waiting { pending: 1 }))
        );
        assert_eq!(
            session.on_yes(players[0].0).await,
            Ok(YesOutcome::Replay(ReplayOutcome::Pending {
                votes: 1,
                required: 2,
            }))
        );
    }

    #[tokio::test]
    async fn test_global_reset_keeps_confirmations_in_unfilled_groups() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b", "c"]).await;
        assert_eq!(
            session.on_yes(players[2].0).await,
            Ok(YesOutcome::Confirmed(Confirmation::Waiting { pending: 1 }))
        );
        start_round(&session, &players[..2]).await;
        session.on_score_report(players[0].0, 1).await.unwrap();
        session.on_score_report(players[1].0, 2).await.unwrap();
        for (id, _) in &players {
            session.on_yes(*id).await.unwrap();
        }

        let late = join(&session, &["d"]).await;
        assert_eq!(
            session.on_yes(late[0].0).await,
            Ok(YesOutcome::Confirmed(Confirmation::Released(GroupId(2))))
        );
    }

    #[tokio::test]
    async fn test_per_group_replay_resets_only_that_group() {
        let config = SessionConfig {
            replay_scope: ReplayScope::PerGroup,
            ..SessionConfig::with_group_size(2)
        };
        let session = orchestrator(config);
        let players = join(&session, &["a", "b", "c", "d"]).await;
        start_round(&session, &players).await;
        for (id, _) in &players {
            session.on_score_report(*id, 1).await.unwrap();
        }

        session.on_replay_request(players[0].0).await.unwrap();
        assert_eq!(
            session.on_replay_request(players[1].0).await,
            Ok(ReplayOutcome::Reset(vec![GroupId(1)]))
        );
        assert_eq!(
            session.group_state_of(players[2].0).await,
            Some(GroupState::AwaitingReplay)
        );
        assert_eq!(
            session.round_scores(GroupId(2)).await.map(|scores| scores.len()),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_disconnect_unblocks_registration() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let mut players = join(&session, &["x", "y", "z"]).await;
        session.on_confirm_play(players[0].0).await.unwrap();
        session.on_confirm_play(players[1].0).await.unwrap();

        session.on_disconnect(players[2].0).await;

        assert_eq!(
            session.group_state_of(players[0].0).await,
            Some(GroupState::Playing)
        );
        match drain(&mut players[0].1).first() {
            Some(ServerMessage::RoundStart { players, .. }) => {
                assert_eq!(players, &vec!["x", "y"]);
            }
            other => panic!("Unexpected message {:?}", other),
        }
        assert_eq!(session.connected_players().await, 2);
    }

    #[tokio::test]
    async fn test_disconnect_mid_round_completes_round() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let players = join(&session, &["x", "y", "z"]).await;
        start_round(&session, &players).await;
        session.on_score_report(players[0].0, 4).await.unwrap();
        session.on_score_report(players[1].0, 2).await.unwrap();

        session.on_disconnect(players[2].0).await;

        assert_eq!(
            session.group_state_of(players[0].0).await,
            Some(GroupState::AwaitingReplay)
        );
        assert_eq!(
            session.player_status(players[2].0).await,
            Some(PlayerStatus::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_disconnect_completes_pending_replay_consensus() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b"]).await;
        start_round(&session, &players).await;
        session.on_score_report(players[0].0, 1).await.unwrap();
        session.on_score_report(players[1].0, 1).await.unwrap();
        session.on_replay_request(players[0].0).await.unwrap();

        session.on_disconnect(players[1].0).await;

        assert_eq!(
            session.group_state_of(players[0].0).await,
            Some(GroupState::AwaitingRegistration)
        );
    }

    #[tokio::test]
    async fn test_disconnect_frees_username_and_slot_stays_taken() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a"]).await;
        session.on_disconnect(players[0].0).await;
        session.on_disconnect(players[0].0).await;

        let (again, _rx) = connect(&session).await;
        assert_eq!(session.on_authenticated(again, "a").await, Ok(GroupId(1)));

        let overview = session.groups_overview().await;
        assert_eq!(overview[0].members, vec!["a", "a"]);
        assert_eq!(overview[0].state, GroupState::AwaitingRegistration);
        assert_eq!(
            session.on_confirm_play(players[0].0).await,
            Err(SessionError::UnknownConnection(players[0].0))
        );
    }

    #[tokio::test]
    async fn test_progress_updates_show_scores_in_membership_order() {
        let session = orchestrator(SessionConfig::with_group_size(3));
        let mut players = join(&session, &["x", "y", "z"]).await;
        start_round(&session, &players).await;
        session.on_score_report(players[2].0, 7).await.unwrap();
        session.on_score_report(players[0].0, 3).await.unwrap();
        for (_, rx) in players.iter_mut() {
            drain(rx);
        }

        let delivered = session.on_progress(players[1].0, "apple", "4/5").await;

        assert_eq!(delivered, Ok(3));
        let expected = ServerMessage::Update {
            word: "apple".to_string(),
            performance: "y 4/5".to_string(),
            live_scores: vec![("x".to_string(), 3), ("z".to_string(), 7)],
        };
        for (_, rx) in players.iter_mut() {
            assert_eq!(drain(rx), vec![expected.clone()]);
        }
    }

    #[tokio::test]
    async fn test_progress_outside_round_is_rejected() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["x"]).await;

        assert_eq!(
            session.on_progress(players[0].0, "apple", "").await,
            Err(SessionError::NotPlaying(GroupId(1)))
        );
    }

    #[tokio::test]
    async fn test_round_waiter_wakes_on_release() {
        let session = orchestrator(SessionConfig::with_group_size(2));
        let players = join(&session, &["a", "b"]).await;
        let watcher = session.subscribe(GroupId(1)).await.unwrap();
        let mut waiter = task::spawn(barrier::wait_for_round(watcher, 1));

        assert_pending!(waiter.poll());
        session.on_confirm_play(players[0].0).await.unwrap();
        assert_pending!(waiter.poll());
        session.on_confirm_play(players[1].0).await.unwrap();

        assert!(waiter.is_woken());
        let snapshot = assert_ready!(waiter.poll());
        assert_eq!(snapshot.map(|s| s.state), Some(GroupState::Playing));
        assert_eq!(
            session.wait_for_round(GroupId(1), 1).await.map(|s| s.round),
            Some(1)
        );
    }
}
