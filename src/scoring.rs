// Score delta calculation for social signals.
//
// The magnitude of a signal depends on where the actor stands relative to
// the target: scoring someone above you counts for more than piling onto
// someone below you. Negative signals mirror the positive magnitudes with
// the sign flipped.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::rank::RankTier;

/// Direction of a social signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreEventKind {
    Positive,
    Negative,
}

impl std::fmt::Display for ScoreEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreEventKind::Positive => write!(f, "positive"),
            ScoreEventKind::Negative => write!(f, "negative"),
        }
    }
}

pub const DEFAULT_UP: i64 = 6;
pub const DEFAULT_PEER: i64 = 3;
pub const DEFAULT_DOWN: i64 = 1;

/// Signed-delta table indexed by the actor/target rank relation.
///
/// Invariant: `up >= peer >= down >= 0`. Scoring upward is never worth
/// less than scoring a peer, and scoring a peer never less than scoring
/// downward.
#[derive(Debug, Clone, Copy)]
pub struct ImpactPolicy {
    up: i64,
    peer: i64,
    down: i64,
}

impl ImpactPolicy {
    /// Returns None when the magnitudes violate the ordering invariant.
    pub fn new(up: i64, peer: i64, down: i64) -> Option<Self> {
        if up >= peer && peer >= down && down >= 0 {
            Some(Self { up, peer, down })
        } else {
            None
        }
    }

    /// The signed rating change a signal from `actor_rank` applies to a
    /// target at `target_rank`. Pure.
    pub fn delta(&self, kind: ScoreEventKind, actor_rank: RankTier, target_rank: RankTier) -> i64 {
        let magnitude = match actor_rank.cmp(&target_rank) {
            Ordering::Less => self.up,
            Ordering::Equal => self.peer,
            Ordering::Greater => self.down,
        };
        match kind {
            ScoreEventKind::Positive => magnitude,
            ScoreEventKind::Negative => -magnitude,
        }
    }
}

impl Default for ImpactPolicy {
    fn default() -> Self {
        Self {
            up: DEFAULT_UP,
            peer: DEFAULT_PEER,
            down: DEFAULT_DOWN,
        }
    }
}
