//! # Typing Race Protocol
//!
//! Line-oriented text protocol spoken between the typing race server and its
//! clients. Every message is a single UTF-8 line terminated by `\n`.
//!
//! ## Client commands
//! After authenticating, a client drives the game with short commands:
//! - `yes` / `READY` confirm intent to play (or to play again after a round)
//! - `SCORE <n>` reports the final number of correctly typed words
//! - `PROGRESS <word> <performance...>` reports live progress during a round
//! - `QUIT` leaves active play and keeps watching as a viewer
//! - `PLAY_AGAIN` votes for another round
//!
//! ## Server messages
//! The server answers with free text prompts plus a handful of structured
//! lines that clients parse: round start, round updates, the winner
//! announcement and the replay prompt.
//!
//! Usernames and words never contain whitespace, which keeps every structured
//! line splittable on spaces.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_GROUP_SIZE: usize = 3;

const ROUND_START_TAG: &str = "ROUND_START";
const UPDATE_TAG: &str = "UPDATE";
const LIVE_SCORES_LABEL: &str = "Live Scores:";
const WINNER_PREFIX: &str = "The Winner is ";
const WINNER_SCORE_SEPARATOR: &str = " with score: ";
const NO_WINNER_TEXT: &str = "No winner this round.";
const REPLAY_PROMPT_TEXT: &str = "Do you want to play again? (yes/no)";

/// Seconds a player gets to type the word at `index` in a round.
///
/// The limit shrinks by one second per word for the first 25 words and then
/// stays at six seconds.
pub fn word_time_limit_secs(index: usize) -> u64 {
    if index < 25 {
        30 - index as u64
    } else {
        6
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("invalid score: {0}")]
    InvalidScore(String),
}

/// Commands a client sends once it has logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Yes,
    No,
    Login,
    Ready,
    Score(u32),
    Progress { word: String, performance: String },
    Quit,
    PlayAgain,
}

impl FromStr for ClientCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        if head.is_empty() {
            return Err(ParseError::Empty);
        }

        match head.to_ascii_uppercase().as_str() {
            "YES" => Ok(ClientCommand::Yes),
            "NO" => Ok(ClientCommand::No),
            "LOGIN" => Ok(ClientCommand::Login),
            "READY" => Ok(ClientCommand::Ready),
            "QUIT" => Ok(ClientCommand::Quit),
            "PLAY_AGAIN" => Ok(ClientCommand::PlayAgain),
            "SCORE" => {
                if rest.is_empty() {
                    return Err(ParseError::MissingArgument("SCORE"));
                }
                rest.parse::<u32>()
                    .map(ClientCommand::Score)
                    .map_err(|_| ParseError::InvalidScore(rest.to_string()))
            }
            "PROGRESS" => {
                let (word, performance) = match rest.split_once(char::is_whitespace) {
                    Some((word, performance)) => (word, performance.trim()),
                    None => (rest, ""),
                };
                if word.is_empty() {
                    return Err(ParseError::MissingArgument("PROGRESS"));
                }
                Ok(ClientCommand::Progress {
                    word: word.to_string(),
                    performance: performance.to_string(),
                })
            }
            _ => Err(ParseError::UnknownCommand(head.to_string())),
        }
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCommand::Yes => write!(f, "yes"),
            ClientCommand::No => write!(f, "no"),
            ClientCommand::Login => write!(f, "login"),
            ClientCommand::Ready => write!(f, "READY"),
            ClientCommand::Score(score) => write!(f, "SCORE {}", score),
            ClientCommand::Progress { word, performance } => {
                write!(f, "PROGRESS {}", word)?;
                if !performance.is_empty() {
                    write!(f, " {}", performance)?;
                }
                Ok(())
            }
            ClientCommand::Quit => write!(f, "QUIT"),
            ClientCommand::PlayAgain => write!(f, "PLAY_AGAIN"),
        }
    }
}

/// Messages pushed from the server to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Free text: prompts, acknowledgements and error replies.
    Text(String),
    RoundStart {
        group_id: u32,
        players: Vec<String>,
        words: Vec<String>,
    },
    /// Live round update. Scores are listed in group membership order.
    Update {
        word: String,
        performance: String,
        live_scores: Vec<(String, u32)>,
    },
    Winner {
        username: String,
        score: u32,
    },
    NoWinner,
    ReplayPrompt,
}

impl ServerMessage {
    pub fn text(message: impl Into<String>) -> Self {
        ServerMessage::Text(message.into())
    }

    /// Parses a line received from the server. Lines that are not one of the
    /// structured messages come back as [`ServerMessage::Text`].
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim_end();
        Self::parse_structured(trimmed).unwrap_or_else(|| ServerMessage::Text(trimmed.to_string()))
    }

    fn parse_structured(line: &str) -> Option<Self> {
        if line == NO_WINNER_TEXT {
            return Some(ServerMessage::NoWinner);
        }
        if line == REPLAY_PROMPT_TEXT {
            return Some(ServerMessage::ReplayPrompt);
        }
        if let Some(rest) = line.strip_prefix(WINNER_PREFIX) {
            let (username, score) = rest.rsplit_once(WINNER_SCORE_SEPARATOR)?;
            return Some(ServerMessage::Winner {
                username: username.to_string(),
                score: score.trim().parse().ok()?,
            });
        }

        let mut tokens = line.split_whitespace();
        match tokens.next()? {
            ROUND_START_TAG => {
                let group_id = tokens.next()?.parse().ok()?;
                let players = tokens
                    .next()?
                    .split(',')
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
                let words = tokens.map(str::to_string).collect();
                Some(ServerMessage::RoundStart {
                    group_id,
                    players,
                    words,
                })
            }
            UPDATE_TAG => {
                let body = line.strip_prefix(UPDATE_TAG)?;
                let label_at = body.find(LIVE_SCORES_LABEL)?;
                let (head, tail) = body.split_at(label_at);
                let head = head.trim();
                let (word, performance) = match head.split_once(char::is_whitespace) {
                    Some((word, performance)) => (word, performance.trim()),
                    None => (head, ""),
                };

                let score_tokens: Vec<&str> = tail[LIVE_SCORES_LABEL.len()..]
                    .split_whitespace()
                    .collect();
                if score_tokens.len() % 2 != 0 {
                    return None;
                }
                let mut live_scores = Vec::with_capacity(score_tokens.len() / 2);
                for pair in score_tokens.chunks(2) {
                    let username = pair[0].strip_suffix(':')?;
                    live_scores.push((username.to_string(), pair[1].parse().ok()?));
                }

                Some(ServerMessage::Update {
                    word: word.to_string(),
                    performance: performance.to_string(),
                    live_scores,
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Text(text) => write!(f, "{}", text),
            ServerMessage::RoundStart {
                group_id,
                players,
                words,
            } => {
                write!(f, "{} {} {}", ROUND_START_TAG, group_id, players.join(","))?;
                for word in words {
                    write!(f, " {}", word)?;
                }
                Ok(())
            }
            ServerMessage::Update {
                word,
                performance,
                live_scores,
            } => {
                write!(f, "{} {}", UPDATE_TAG, word)?;
                if !performance.is_empty() {
                    write!(f, " {}", performance)?;
                }
                write!(f, " {}", LIVE_SCORES_LABEL)?;
                for (username, score) in live_scores {
                    write!(f, " {}: {}", username, score)?;
                }
                Ok(())
            }
            ServerMessage::Winner { username, score } => {
                write!(f, "{}{}{}{}", WINNER_PREFIX, username, WINNER_SCORE_SEPARATOR, score)
            }
            ServerMessage::NoWinner => write!(f, "{}", NO_WINNER_TEXT),
            ServerMessage::ReplayPrompt => write!(f, "{}", REPLAY_PROMPT_TEXT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_time_limit_shrinks_then_floors() {
        assert_eq!(word_time_limit_secs(0), 30);
        assert_eq!(word_time_limit_secs(10), 20);
        assert_eq!(word_time_limit_secs(24), 6);
        assert_eq!(word_time_limit_secs(25), 6);
        assert_eq!(word_time_limit_secs(500), 6);
    }

    #[test]
    fn test_parse_simple_commands_case_insensitive() {
        assert_eq!("yes".parse(), Ok(ClientCommand::Yes));
        assert_eq!("YES".parse(), Ok(ClientCommand::Yes));
        assert_eq!(" No ".parse(), Ok(ClientCommand::No));
        assert_eq!("login".parse(), Ok(ClientCommand::Login));
        assert_eq!("quit".parse(), Ok(ClientCommand::Quit));
        assert_eq!("PLAY_AGAIN".parse(), Ok(ClientCommand::PlayAgain));
        assert_eq!("ready".parse(), Ok(ClientCommand::Ready));
    }

    #[test]
    fn test_parse_score() {
        assert_eq!("SCORE 12".parse(), Ok(ClientCommand::Score(12)));
        assert_eq!(
            "SCORE".parse::<ClientCommand>(),
            Err(ParseError::MissingArgument("SCORE"))
        );
        assert_eq!(
            "SCORE -3".parse::<ClientCommand>(),
            Err(ParseError::InvalidScore("-3".to_string()))
        );
    }

    #[test]
    fn test_parse_progress_keeps_performance_text() {
        let command: ClientCommand = "PROGRESS banana 4/5 words".parse().unwrap();
        assert_eq!(
            command,
            ClientCommand::Progress {
                word: "banana".to_string(),
                performance: "4/5 words".to_string(),
            }
        );
        assert_eq!(command.to_string(), "PROGRESS banana 4/5 words");

        assert_eq!(
            "PROGRESS".parse::<ClientCommand>(),
            Err(ParseError::MissingArgument("PROGRESS"))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert_eq!("".parse::<ClientCommand>(), Err(ParseError::Empty));
        assert_eq!(
            "dance".parse::<ClientCommand>(),
            Err(ParseError::UnknownCommand("dance".to_string()))
        );
    }

    #[test]
    fn test_update_line_lists_scores_in_given_order() {
        let message = ServerMessage::Update {
            word: "apple".to_string(),
            performance: "3/4".to_string(),
            live_scores: vec![("zed".to_string(), 4), ("amy".to_string(), 9)],
        };

        assert_eq!(message.to_string(), "UPDATE apple 3/4 Live Scores: zed: 4 amy: 9");
        assert_eq!(ServerMessage::parse(&message.to_string()), message);
    }

    #[test]
    fn test_update_line_without_scores() {
        let line = "UPDATE apple Live Scores:";
        assert_eq!(
            ServerMessage::parse(line),
            ServerMessage::Update {
                word: "apple".to_string(),
                performance: String::new(),
                live_scores: vec![],
            }
        );
    }

    #[test]
    fn test_winner_line_format() {
        let message = ServerMessage::Winner {
            username: "alice".to_string(),
            score: 10,
        };
        assert_eq!(message.to_string(), "The Winner is alice with score: 10");
        assert_eq!(ServerMessage::parse("The Winner is alice with score: 10"), message);
    }

    #[test]
    fn test_round_start_line() {
        let message = ServerMessage::RoundStart {
            group_id: 2,
            players: vec!["x".to_string(), "y".to_string()],
            words: vec!["red".to_string(), "green".to_string()],
        };
        assert_eq!(message.to_string(), "ROUND_START 2 x,y red green");
        assert_eq!(ServerMessage::parse("ROUND_START 2 x,y red green\r\n"), message);
    }

    #[test]
    fn test_unstructured_lines_fall_back_to_text() {
        assert_eq!(
            ServerMessage::parse("Waiting for other players to join..."),
            ServerMessage::text("Waiting for other players to join...")
        );
        assert_eq!(
            ServerMessage::parse("The Winner is nobody"),
            ServerMessage::text("The Winner is nobody")
        );
        assert_eq!(
            ServerMessage::parse("UPDATE apple Live Scores: broken"),
            ServerMessage::text("UPDATE apple Live Scores: broken")
        );
        assert_eq!(ServerMessage::parse(REPLAY_PROMPT_TEXT), ServerMessage::ReplayPrompt);
        assert_eq!(ServerMessage::parse(NO_WINNER_TEXT), ServerMessage::NoWinner);
    }
}
