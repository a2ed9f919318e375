// Slot machine mini-game. The rating balance is the currency.

use lazy_static::lazy_static;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::Serialize;

pub const SYMBOLS: [&str; 5] = ["🍋", "🍒", "🍇", "🎰", "7️⃣"];
/// Draw weights per symbol; rarer symbols pay more.
pub const WEIGHTS: [u32; 5] = [70, 55, 50, 10, 3];
/// Triple-match payout multiplier per symbol.
pub const MULTIPLIERS: [i64; 5] = [8, 13, 25, 200, 1000];

lazy_static! {
    static ref REEL_DIST: WeightedIndex<u32> =
        WeightedIndex::new(WEIGHTS).expect("reel weights must be positive");
}

/// One spin of the reels.
#[derive(Debug, Clone, Serialize)]
pub struct Roll {
    pub symbols: [&'static str; 3],
    pub winnings: i64,
}

/// Winnings for a set of reels: stake times the symbol multiplier on a
/// triple, zero otherwise.
pub fn payout(symbols: [&'static str; 3], stake: i64) -> i64 {
    if symbols[0] != symbols[1] || symbols[1] != symbols[2] {
        return 0;
    }
    match SYMBOLS.iter().position(|&s| s == symbols[0]) {
        Some(i) => stake * MULTIPLIERS[i],
        None => 0,
    }
}

/// Draw three weighted symbols and price the result.
pub fn spin<R: Rng>(rng: &mut R, stake: i64) -> Roll {
    let symbols = [
        SYMBOLS[REEL_DIST.sample(rng)],
        SYMBOLS[REEL_DIST.sample(rng)],
        SYMBOLS[REEL_DIST.sample(rng)],
    ];
    Roll {
        symbols,
        winnings: payout(symbols, stake),
    }
}
