// Token usage costing for paid LLM interactions.
//
// Accumulated token counts live in the store (see db); this module prices
// them. Integer cents keep threshold comparisons exact.

use serde::Serialize;

/// Price per million input tokens, in cents.
pub const INPUT_PRICE_CENTS_PER_MTOK: i64 = 300;
/// Price per million output tokens, in cents.
pub const OUTPUT_PRICE_CENTS_PER_MTOK: i64 = 1500;

const TOKENS_PER_MTOK: i64 = 1_000_000;

/// Cost in cents of the accumulated usage, rounded down.
pub fn cost_cents(input_tokens: i64, output_tokens: i64) -> i64 {
    (input_tokens * INPUT_PRICE_CENTS_PER_MTOK + output_tokens * OUTPUT_PRICE_CENTS_PER_MTOK)
        / TOKENS_PER_MTOK
}

/// Accumulated usage with its price, as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub user_id: i64,
    pub chat_id: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_cents: i64,
    /// True once the cost is past the paid threshold and the ai action
    /// runs under the strict policy.
    pub paid_limit_active: bool,
}

impl UsageReport {
    pub fn new(
        user_id: i64,
        chat_id: i64,
        input_tokens: i64,
        output_tokens: i64,
        threshold_cents: i64,
    ) -> Self {
        let cost = cost_cents(input_tokens, output_tokens);
        Self {
            user_id,
            chat_id,
            input_tokens,
            output_tokens,
            cost_cents: cost,
            paid_limit_active: cost > threshold_cents,
        }
    }
}
