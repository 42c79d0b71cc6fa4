//! Word lists for typing rounds.

use crate::error::WordBankError;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

const BUILTIN_WORDS: &[&str] = &[
    "apple", "river", "mountain", "keyboard", "window", "garden", "planet", "rocket",
    "silver", "thunder", "lantern", "orange", "puzzle", "harbor", "violet", "canyon",
    "blanket", "compass", "meadow", "falcon", "crystal", "journey", "marble", "pepper",
    "shadow", "timber", "velvet", "whisper", "anchor", "breeze", "candle", "dolphin",
    "emerald", "forest", "glacier", "horizon", "island", "jungle", "kettle", "ladder",
];

/// The pool of words rounds are drawn from.
#[derive(Debug, Clone)]
pub struct WordBank {
    words: Vec<String>,
}

impl WordBank {
    pub fn builtin() -> Self {
        Self {
            words: BUILTIN_WORDS.iter().map(|word| word.to_string()).collect(),
        }
    }

    /// Loads one word per line. Blank lines and lines containing inner
    /// whitespace are skipped.
    pub fn from_file(path: &Path) -> Result<Self, WordBankError> {
        let contents = std::fs::read_to_string(path).map_err(|source| WordBankError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let bank = Self::parse(&contents);
        if bank.is_empty() {
            return Err(WordBankError::Empty(path.to_path_buf()));
        }
        Ok(bank)
    }

    pub fn parse(contents: &str) -> Self {
        let words = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.contains(char::is_whitespace))
            .map(str::to_string)
            .collect();
        Self { words }
    }

    /// Draws up to `count` distinct entries in random order.
    pub fn draw<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<String> {
        let mut drawn: Vec<String> = self.words.choose_multiple(rng, count).cloned().collect();
        drawn.shuffle(rng);
        drawn
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for WordBank {
    fn default() -> Self {
        Self::builtin()
    }
}
