// Rank tiers and promotion thresholds.
//
// One table drives both rank lookup and milestone detection, so the two
// can never disagree about where a tier begins.

use serde::{Deserialize, Serialize};

/// Default promotion thresholds, lowest tier first.
pub const DEFAULT_THRESHOLDS: [i64; 6] = [0, 50, 100, 300, 600, 1000];

/// A user's standing band. Ordered: comparisons follow tier order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RankTier {
    Newcomer,
    Helper,
    Contributor,
    Veteran,
    Expert,
    Legend,
}

impl RankTier {
    pub const ALL: [RankTier; 6] = [
        RankTier::Newcomer,
        RankTier::Helper,
        RankTier::Contributor,
        RankTier::Veteran,
        RankTier::Expert,
        RankTier::Legend,
    ];
}

impl std::fmt::Display for RankTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankTier::Newcomer => write!(f, "Newcomer"),
            RankTier::Helper => write!(f, "Helper"),
            RankTier::Contributor => write!(f, "Contributor"),
            RankTier::Veteran => write!(f, "Veteran"),
            RankTier::Expert => write!(f, "Expert"),
            RankTier::Legend => write!(f, "Legend"),
        }
    }
}

/// Maps ratings to tiers and detects promotions.
#[derive(Debug, Clone)]
pub struct RankTable {
    thresholds: [i64; 6],
}

impl RankTable {
    /// Build a table from six thresholds. The first must be 0 and the rest
    /// strictly ascending, so every rating (negatives included) maps to a
    /// tier. Returns None otherwise.
    pub fn new(thresholds: [i64; 6]) -> Option<Self> {
        if thresholds[0] != 0 {
            return None;
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return None;
        }
        Some(Self { thresholds })
    }

    /// The highest tier whose threshold the rating meets. Total: ratings
    /// below the second threshold, including negative ones, are Newcomer.
    pub fn rank_of(&self, rating: i64) -> RankTier {
        let mut tier = RankTier::Newcomer;
        for (i, &t) in self.thresholds.iter().enumerate() {
            if rating >= t {
                tier = RankTier::ALL[i];
            }
        }
        tier
    }

    /// The tier newly entered by moving from `before` to `after`, if the
    /// move is a promotion. A jump across several thresholds reports only
    /// the highest tier reached; downward moves and churn inside a tier
    /// report nothing. Climbing out of the negatives back to the base tier
    /// is not a promotion.
    pub fn milestone(&self, before: i64, after: i64) -> Option<RankTier> {
        let to = self.rank_of(after);
        if to > self.rank_of(before) {
            Some(to)
        } else {
            None
        }
    }

    /// The rating at which a tier begins.
    pub fn threshold(&self, tier: RankTier) -> i64 {
        self.thresholds[tier as usize]
    }
}

impl Default for RankTable {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_of_boundaries() {
        let table = RankTable::default();
        assert_eq!(table.rank_of(0), RankTier::Newcomer);
        assert_eq!(table.rank_of(49), RankTier::Newcomer);
        assert_eq!(table.rank_of(50), RankTier::Helper);
        assert_eq!(table.rank_of(99), RankTier::Helper);
        assert_eq!(table.rank_of(100), RankTier::Contributor);
        assert_eq!(table.rank_of(299), RankTier::Contributor);
        assert_eq!(table.rank_of(300), RankTier::Veteran);
        assert_eq!(table.rank_of(599), RankTier::Veteran);
        assert_eq!(table.rank_of(600), RankTier::Expert);
        assert_eq!(table.rank_of(999), RankTier::Expert);
        assert_eq!(table.rank_of(1000), RankTier::Legend);
        assert_eq!(table.rank_of(5000), RankTier::Legend);
    }

    #[test]
    fn test_rank_of_negative_is_base_tier() {
        let table = RankTable::default();
        assert_eq!(table.rank_of(-1), RankTier::Newcomer);
        assert_eq!(table.rank_of(-10_000), RankTier::Newcomer);
    }

    #[test]
    fn test_rank_of_monotone() {
        let table = RankTable::default();
        let mut prev = table.rank_of(-100);
        for rating in -99..=1200 {
            let cur = table.rank_of(rating);
            assert!(cur >= prev, "rank dropped at rating {rating}");
            prev = cur;
        }
    }

    #[test]
    fn test_milestone_single_step() {
        let table = RankTable::default();
        assert_eq!(table.milestone(49, 50), Some(RankTier::Helper));
        assert_eq!(table.milestone(99, 100), Some(RankTier::Contributor));
        assert_eq!(table.milestone(999, 1000), Some(RankTier::Legend));
    }

    #[test]
    fn test_milestone_never_downward() {
        let table = RankTable::default();
        assert_eq!(table.milestone(50, 49), None);
        assert_eq!(table.milestone(1000, 0), None);
        assert_eq!(table.milestone(100, 100), None);
    }

    #[test]
    fn test_milestone_big_jump_reports_highest_only() {
        let table = RankTable::default();
        assert_eq!(table.milestone(10, 2000), Some(RankTier::Legend));
        assert_eq!(table.milestone(0, 350), Some(RankTier::Veteran));
    }

    #[test]
    fn test_milestone_within_tier() {
        let table = RankTable::default();
        assert_eq!(table.milestone(51, 60), None);
        assert_eq!(table.milestone(0, 49), None);
    }

    #[test]
    fn test_milestone_negative_to_zero() {
        let table = RankTable::default();
        // Recovering to the base tier is not a promotion.
        assert_eq!(table.milestone(-5, 0), None);
        assert_eq!(table.milestone(-5, 49), None);
        assert_eq!(table.milestone(-5, 50), Some(RankTier::Helper));
    }

    #[test]
    fn test_table_validation() {
        assert!(RankTable::new([0, 50, 100, 300, 600, 1000]).is_some());
        assert!(RankTable::new([1, 50, 100, 300, 600, 1000]).is_none());
        assert!(RankTable::new([0, 50, 50, 300, 600, 1000]).is_none());
        assert!(RankTable::new([0, 100, 50, 300, 600, 1000]).is_none());
    }

    #[test]
    fn test_threshold_lookup() {
        let table = RankTable::default();
        assert_eq!(table.threshold(RankTier::Newcomer), 0);
        assert_eq!(table.threshold(RankTier::Helper), 50);
        assert_eq!(table.threshold(RankTier::Legend), 1000);
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(RankTier::Helper.to_string(), "Helper");
        assert_eq!(RankTier::Legend.to_string(), "Legend");
    }
}
