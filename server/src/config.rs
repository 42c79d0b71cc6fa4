//! Session configuration, fixed when the server starts.

use clap::ValueEnum;
use shared::DEFAULT_GROUP_SIZE;

pub const DEFAULT_WORDS_PER_ROUND: usize = 20;

/// Which players must agree before a new round starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplayScope {
    /// Every connected player on the server, across all groups.
    Global,
    /// Only the connected members of the voter's group.
    PerGroup,
}

/// How ties on the highest score are broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TieBreak {
    /// The earliest reported score among the tied players wins.
    FirstReported,
    /// The alphabetically smallest username among the tied players wins.
    Lexicographic,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub group_size: usize,
    pub replay_scope: ReplayScope,
    pub tie_break: TieBreak,
    pub words_per_round: usize,
}

impl SessionConfig {
    pub fn with_group_size(group_size: usize) -> Self {
        Self {
            group_size,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            replay_scope: ReplayScope::Global,
            tie_break: TieBreak::FirstReported,
            words_per_round: DEFAULT_WORDS_PER_ROUND,
        }
    }
}
