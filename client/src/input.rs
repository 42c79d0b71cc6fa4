//! Client input handling: turns typed lines and server messages into lines
//! to send and text to show

use crate::game::{Attempt, TypingRound};
use log::{debug, info};
use shared::{ClientCommand, ServerMessage};
use std::time::{Duration, Instant};

/// Typed during a round to stop playing and keep watching.
pub const QUIT_INPUT: &str = "/quit";

/// What the client should do in response to one event.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Lines for the server, in order.
    pub send: Vec<String>,
    /// Lines for the terminal, in order.
    pub show: Vec<String>,
}

impl Reaction {
    fn send(&mut self, command: ClientCommand) {
        self.send.push(command.to_string());
    }

    fn show(&mut self, text: impl Into<String>) {
        self.show.push(text.into());
    }
}

struct ActiveRound {
    round: TypingRound,
    word_started: Instant,
}

/// Tracks whether a typing round is running and routes input accordingly.
/// Outside a round every typed line is relayed to the server unchanged.
#[derive(Default)]
pub struct InputManager {
    active: Option<ActiveRound>,
    viewer: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_round(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_viewer(&self) -> bool {
        self.viewer
    }

    /// When the current word times out, if a round is running.
    pub fn deadline(&self) -> Option<Instant> {
        self.active
            .as_ref()
            .map(|active| active.word_started + active.round.time_limit())
    }

    pub fn on_server_line(&mut self, line: &str, now: Instant) -> Reaction {
        let mut reaction = Reaction::default();

        match ServerMessage::parse(line) {
            ServerMessage::RoundStart {
                group_id,
                players,
                words,
            } => {
                reaction.show(format!(
                    "Round started in group {} with {}.",
                    group_id,
                    players.join(", ")
                ));
                if self.viewer {
                    reaction.show("You are watching this round.");
                } else {
                    info!("Starting a round of {} words", words.len());
                    self.active = Some(ActiveRound {
                        round: TypingRound::new(words),
                        word_started: now,
                    });
                    self.next_word_or_finish(&mut reaction);
                }
            }
            ServerMessage::Update {
                word,
                performance,
                live_scores,
            } => {
                let scores: Vec<String> = live_scores
                    .iter()
                    .map(|(name, score)| format!("{}: {}", name, score))
                    .collect();
                reaction.show(format!(
                    "[{}] {} | Live Scores: {}",
                    word,
                    performance,
                    scores.join(" ")
                ));
            }
            message @ ServerMessage::ReplayPrompt => {
                reaction.show(message.to_string());
                reaction.show("Type yes or PLAY_AGAIN to vote for another round.");
            }
            message => reaction.show(message.to_string()),
        }

        reaction
    }

    pub fn on_input(&mut self, line: &str, now: Instant) -> Reaction {
        let mut reaction = Reaction::default();
        let input = line.trim();

        if input.eq_ignore_ascii_case(QUIT_INPUT) {
            self.quit(&mut reaction);
            return reaction;
        }

        let Some(active) = self.active.as_mut() else {
            reaction.send.push(input.to_string());
            return reaction;
        };

        let elapsed = now.saturating_duration_since(active.word_started);
        let word = active.round.current_word().map(str::to_string);
        if let (Some(word), Some(attempt)) = (word, active.round.submit(input, elapsed)) {
            self.after_attempt(&word, attempt, now, &mut reaction);
        }
        reaction
    }

    /// The current word's limit passed without input.
    pub fn on_deadline(&mut self, now: Instant) -> Reaction {
        let mut reaction = Reaction::default();
        let Some(active) = self.active.as_mut() else {
            return reaction;
        };

        let word = active.round.current_word().map(str::to_string);
        if let (Some(word), Some(attempt)) = (word, active.round.timeout()) {
            self.after_attempt(&word, attempt, now, &mut reaction);
        }
        reaction
    }

    fn after_attempt(&mut self, word: &str, attempt: Attempt, now: Instant, reaction: &mut Reaction) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.word_started = now;

        match attempt {
            Attempt::Correct => reaction.show("Correct!"),
            Attempt::Wrong => reaction.show(format!("Incorrect! The word was {}.", word)),
            Attempt::TimedOut => reaction.show(format!("Time is up! The word was {}.", word)),
        }
        reaction.send(ClientCommand::Progress {
            word: word.to_string(),
            performance: active.round.progress_text(),
        });

        self.next_word_or_finish(reaction);
    }

    fn next_word_or_finish(&mut self, reaction: &mut Reaction) {
        let Some(active) = self.active.as_ref() else {
            return;
        };

        match active.round.current_word() {
            Some(word) => reaction.show(format!(
                "Word {}/{} ({}s): {}",
                active.round.position(),
                active.round.len(),
                active.round.time_limit().as_secs(),
                word
            )),
            None => {
                let round = &active.round;
                debug!("Round finished with score {}", round.score());
                reaction.show(round.summary().to_string());
                reaction.send(ClientCommand::Score(round.score()));
                self.active = None;
            }
        }
    }

    fn quit(&mut self, reaction: &mut Reaction) {
        if let Some(active) = self.active.take() {
            reaction.send(ClientCommand::Score(active.round.score()));
        }
        if !self.viewer {
            reaction.send(ClientCommand::Quit);
            reaction.show("You left the race and will keep watching as a viewer.");
            self.viewer = true;
        }
    }
}

/// Time left until `deadline`, zero if it already passed.
pub fn remaining(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}
