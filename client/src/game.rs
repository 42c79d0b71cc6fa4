use log::debug;
use shared::word_time_limit_secs;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Correct,
    Wrong,
    TimedOut,
}

/// Local state of one typing round: the shared word list, the position in
/// it, and what the player has typed so far.
#[derive(Debug, Clone)]
pub struct TypingRound {
    words: Vec<String>,
    index: usize,
    correct: u32,
    missed: Vec<String>,
    typing_times: Vec<Duration>,
}

impl TypingRound {
    pub fn new(words: Vec<String>) -> Self {
        Self {
            words,
            index: 0,
            correct: 0,
            missed: Vec::new(),
            typing_times: Vec::new(),
        }
    }

    pub fn current_word(&self) -> Option<&str> {
        self.words.get(self.index).map(String::as_str)
    }

    /// Time allowed for the current word.
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(word_time_limit_secs(self.index))
    }

    /// Position of the current word, starting at 1.
    pub fn position(&self) -> usize {
        self.index + 1
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.words.len()
    }

    /// Checks `input` against the current word, ignoring case, and moves on.
    /// Input arriving after the limit counts as a timeout.
    pub fn submit(&mut self, input: &str, elapsed: Duration) -> Option<Attempt> {
        let limit = self.time_limit();
        let word = self.current_word()?;

        let attempt = if elapsed > limit {
            Attempt::TimedOut
        } else if input.trim().eq_ignore_ascii_case(word) {
            Attempt::Correct
        } else {
            Attempt::Wrong
        };

        self.advance(attempt, elapsed.min(limit));
        Some(attempt)
    }

    /// The limit for the current word ran out.
    pub fn timeout(&mut self) -> Option<Attempt> {
        self.current_word()?;
        let limit = self.time_limit();
        self.advance(Attempt::TimedOut, limit);
        Some(Attempt::TimedOut)
    }

    fn advance(&mut self, attempt: Attempt, elapsed: Duration) {
        let word = self.words[self.index].clone();
        debug!("Word {} ({}): {:?}", self.position(), word, attempt);

        match attempt {
            Attempt::Correct => self.correct += 1,
            Attempt::Wrong | Attempt::TimedOut => self.missed.push(word),
        }
        self.typing_times.push(elapsed);
        self.index += 1;
    }

    pub fn score(&self) -> u32 {
        self.correct
    }

    pub fn attempted(&self) -> usize {
        self.typing_times.len()
    }

    /// Progress line reported to the server, e.g. `3/4`.
    pub fn progress_text(&self) -> String {
        format!("{}/{}", self.correct, self.attempted())
    }

    pub fn average_secs(&self) -> f64 {
        if self.typing_times.is_empty() {
            return 0.0;
        }
        let total: f64 = self.typing_times.iter().map(Duration::as_secs_f64).sum();
        total / self.typing_times.len() as f64
    }

    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            correct: self.correct,
            missed: self.missed.clone(),
            average_secs: self.average_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    pub correct: u32,
    pub missed: Vec<String>,
    pub average_secs: f64,
}

impl fmt::Display for RoundSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "You typed {} words correctly.", self.correct)?;
        if self.missed.is_empty() {
            writeln!(f, "Incorrect words: none.")?;
        } else {
            writeln!(f, "Incorrect words: {}.", self.missed.join(", "))?;
        }
        write!(
            f,
            "Average typing speed: {:.2} seconds per word.",
            self.average_secs
        )
    }
}
