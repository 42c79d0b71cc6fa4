//! Round score table and winner selection.

use crate::config::TieBreak;

/// Final scores of one round, keyed by username.
///
/// Entries keep the order in which they were first reported. Reporting again
/// for the same username overwrites the value in place: last write wins and
/// nothing accumulates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreTable {
    entries: Vec<(String, u32)>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a score and returns the previous value, if any.
    pub fn record(&mut self, username: &str, score: u32) -> Option<u32> {
        match self.entries.iter_mut().find(|(name, _)| name == username) {
            Some((_, existing)) => Some(std::mem::replace(existing, score)),
            None => {
                self.entries.push((username.to_string(), score));
                None
            }
        }
    }

    pub fn get(&self, username: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(name, _)| name == username)
            .map(|(_, score)| *score)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.get(username).is_some()
    }

    /// Entries in report order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(name, score)| (name.as_str(), *score))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
    pub username: String,
    pub score: u32,
}

/// Picks the highest score among `entries`.
///
/// With [`TieBreak::FirstReported`] the first maximum encountered wins, so the
/// result depends on report order. [`TieBreak::Lexicographic`] picks the
/// smallest username among the tied entries instead.
pub fn select_winner<'a>(
    entries: impl IntoIterator<Item = (&'a str, u32)>,
    tie_break: TieBreak,
) -> Option<Winner> {
    let mut best: Option<(&str, u32)> = None;

    for (username, score) in entries {
        let replace = match best {
            None => true,
            Some((best_name, best_score)) => {
                score > best_score
                    || (score == best_score
                        && tie_break == TieBreak::Lexicographic
                        && username < best_name)
            }
        };
        if replace {
            best = Some((username, score));
        }
    }

    best.map(|(username, score)| Winner {
        username: username.to_string(),
        score,
    })
}
