// Rating decay for inactive users.
//
// One pass walks every chat's leaderboard and shaves max(3%, 1) points
// off each positive rating whose owner has been silent for the
// configured window. Users with no recorded activity count as silent.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::db::Database;
use crate::error::EngineError;
use crate::metrics;

/// Percentage cut per pass.
pub const DECAY_PERCENT: i64 = 3;
/// Only the leaderboard head is decayed; the long tail stays put.
pub const DECAY_TOP_N: i64 = 50;

/// One adjustment made by a decay pass.
#[derive(Debug, Clone, Serialize)]
pub struct DecayEntry {
    pub chat_id: i64,
    pub user_id: i64,
    pub before: i64,
    pub after: i64,
}

/// Walk all chats once and decay inactive top-rated users.
/// `now` is unix seconds.
pub async fn run_decay_once(
    db: &Database,
    inactivity_seconds: i64,
    now: i64,
) -> Result<Vec<DecayEntry>, EngineError> {
    let mut adjusted = Vec::new();

    for chat_id in db.list_chats().await? {
        for record in db.top_ratings(chat_id, DECAY_TOP_N).await? {
            if record.rating <= 0 {
                continue;
            }
            let inactive = match db.last_seen(record.user_id, chat_id).await? {
                Some(seen) => now - seen >= inactivity_seconds,
                None => true,
            };
            if !inactive {
                continue;
            }

            let cut = (record.rating * DECAY_PERCENT / 100).max(1);
            let (before, after) = db
                .increment_rating(record.user_id, chat_id, -cut)
                .await?;
            metrics::DECAY_ADJUSTMENTS_TOTAL.inc();
            adjusted.push(DecayEntry {
                chat_id,
                user_id: record.user_id,
                before,
                after,
            });
        }
    }

    if !adjusted.is_empty() {
        tracing::info!("Decay pass adjusted {} ratings", adjusted.len());
    }
    Ok(adjusted)
}

/// Spawn the periodic decay worker.
pub fn spawn_decay_worker(db: Arc<Database>, interval_seconds: u64, inactivity_seconds: i64) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(interval_seconds)).await;

            let now = Utc::now().timestamp();
            if let Err(e) = run_decay_once(&db, inactivity_seconds, now).await {
                tracing::error!("Decay pass failed: {}", e);
            }
        }
    });
}
