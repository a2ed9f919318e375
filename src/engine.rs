// Engine facade: the scoring pipeline and everything callers see.
//
// Pipeline for a score event: validate, throttle, dedup, protected-target
// redirect, rank lookup, delta, increment, milestone, activity touch.
// Suppressed and throttled events are outcomes, not errors; only store
// failures propagate.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db::Database;
use crate::decay::{self, DecayEntry};
use crate::dedup::{DedupCache, DedupKey};
use crate::error::EngineError;
use crate::game;
use crate::metrics;
use crate::rank::{RankTable, RankTier};
use crate::scoring::{ImpactPolicy, ScoreEventKind};
use crate::signals;
use crate::throttle::{ThrottleAction, ThrottleGuard, ThrottleOutcome, PAID_AI_POLICY};
use crate::usage::{self, UsageReport};

/// One social signal, normalized by the adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreEvent {
    pub actor_id: i64,
    pub target_id: i64,
    pub chat_id: i64,
    pub kind: ScoreEventKind,
    /// Message or reaction id; duplicates of the same id are suppressed.
    pub event_id: String,
}

/// One slot machine attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct SpinRequest {
    pub subject_id: i64,
    pub chat_id: i64,
    pub stake: i64,
    /// Optional client request id for duplicate suppression.
    pub event_id: Option<String>,
}

/// Why an event did not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Duplicate,
    Throttled { retry_after_seconds: i64 },
    Rejected { reason: String },
}

impl SkipReason {
    fn label(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::Throttled { .. } => "throttled",
            SkipReason::Rejected { .. } => "rejected",
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub rating: i64,
    pub rank: RankTier,
}

/// Result of a score event. `before`/`after` are meaningful only when
/// `applied` is true.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreOutcome {
    pub applied: bool,
    pub before: i64,
    pub after: i64,
    pub milestone: Option<RankTier>,
    pub skipped: Option<SkipReason>,
}

impl ScoreOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            applied: false,
            before: 0,
            after: 0,
            milestone: None,
            skipped: Some(reason),
        }
    }
}

/// Result of a spin. Reels are empty unless the spin ran.
#[derive(Debug, Clone, Serialize)]
pub struct SpinOutcome {
    pub applied: bool,
    pub symbols: Vec<String>,
    pub stake: i64,
    pub winnings: i64,
    pub before: i64,
    pub after: i64,
    pub milestone: Option<RankTier>,
    pub skipped: Option<SkipReason>,
}

impl SpinOutcome {
    fn skipped(stake: i64, reason: SkipReason) -> Self {
        Self {
            applied: false,
            symbols: Vec::new(),
            stake,
            winnings: 0,
            before: 0,
            after: 0,
            milestone: None,
            skipped: Some(reason),
        }
    }
}

/// Shared facade over the store, caches and policy tables.
pub struct ReputationEngine {
    db: Arc<Database>,
    dedup: DedupCache,
    throttle: ThrottleGuard,
    ranks: RankTable,
    impact: ImpactPolicy,
    dedup_ttl: Duration,
    protected: HashSet<i64>,
    bots: HashSet<i64>,
    paid_cost_threshold_cents: i64,
    decay_inactivity_seconds: i64,
}

impl ReputationEngine {
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        Self {
            dedup: DedupCache::new(),
            throttle: ThrottleGuard::new(db.clone(), config.bypass_ids.clone()),
            ranks: RankTable::default(),
            impact: ImpactPolicy::default(),
            dedup_ttl: Duration::from_secs(config.dedup_ttl_seconds),
            protected: config.protected_ids.clone(),
            bots: config.bot_ids.clone(),
            paid_cost_threshold_cents: config.paid_cost_threshold_cents,
            decay_inactivity_seconds: config.decay_inactivity_seconds,
            db,
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub async fn get_rating(&self, user_id: i64, chat_id: i64) -> Result<i64, EngineError> {
        Ok(self.db.get_rating(user_id, chat_id).await?)
    }

    pub async fn rating_with_rank(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<(i64, RankTier), EngineError> {
        let rating = self.db.get_rating(user_id, chat_id).await?;
        Ok((rating, self.ranks.rank_of(rating)))
    }

    /// Top n users of a chat, highest rating first.
    pub async fn leaderboard(
        &self,
        chat_id: i64,
        n: i64,
    ) -> Result<Vec<LeaderboardEntry>, EngineError> {
        let rows = self.db.top_ratings(chat_id, n).await?;
        Ok(rows
            .into_iter()
            .map(|r| LeaderboardEntry {
                user_id: r.user_id,
                rating: r.rating,
                rank: self.ranks.rank_of(r.rating),
            })
            .collect())
    }

    // ── Score events ──────────────────────────────────────────────────

    /// Apply one validated, throttled, deduplicated score event.
    pub async fn apply_score_event(&self, event: ScoreEvent) -> Result<ScoreOutcome, EngineError> {
        let now = Utc::now().timestamp();

        if let Err(reason) = self.validate(&event) {
            tracing::warn!(
                "Rejected score event from {} in chat {}: {reason}",
                event.actor_id,
                event.chat_id
            );
            return Ok(self.finish_score(&event.kind, ScoreOutcome::skipped(SkipReason::Rejected { reason })));
        }

        match self
            .throttle
            .allow(ThrottleAction::Score, event.actor_id, event.chat_id, now)
            .await
        {
            ThrottleOutcome::Allowed => {}
            ThrottleOutcome::Denied {
                retry_after_seconds,
            } => {
                return Ok(self.finish_score(
                    &event.kind,
                    ScoreOutcome::skipped(SkipReason::Throttled {
                        retry_after_seconds,
                    }),
                ));
            }
        }

        let key = DedupKey {
            actor_id: event.actor_id,
            target_id: event.target_id,
            event_id: event.event_id.clone(),
        };
        if self.dedup.check_and_mark(key, Instant::now(), self.dedup_ttl) {
            return Ok(self.finish_score(&event.kind, ScoreOutcome::skipped(SkipReason::Duplicate)));
        }
        metrics::DEDUP_CACHE_ENTRIES.set(self.dedup.len() as i64);

        // Negative events against protected targets land on the actor.
        let target_id = if event.kind == ScoreEventKind::Negative
            && self.protected.contains(&event.target_id)
        {
            tracing::info!(
                "Redirecting negative event from {} off protected target {}",
                event.actor_id,
                event.target_id
            );
            event.actor_id
        } else {
            event.target_id
        };

        let actor_rating = self.db.get_rating(event.actor_id, event.chat_id).await?;
        let target_rating = self.db.get_rating(target_id, event.chat_id).await?;
        let delta = self.impact.delta(
            event.kind,
            self.ranks.rank_of(actor_rating),
            self.ranks.rank_of(target_rating),
        );

        let (before, after) = self.db.increment_rating(target_id, event.chat_id, delta).await?;
        let milestone = self.ranks.milestone(before, after);
        self.db
            .touch_activity(event.actor_id, event.chat_id, now)
            .await?;

        Ok(self.finish_score(
            &event.kind,
            ScoreOutcome {
                applied: true,
                before,
                after,
                milestone,
                skipped: None,
            },
        ))
    }

    /// Classify a reaction emoji and apply it. Emoji that carry no score
    /// are skipped, not errors.
    pub async fn apply_reaction(
        &self,
        actor_id: i64,
        target_id: i64,
        chat_id: i64,
        emoji: &str,
        event_id: String,
    ) -> Result<ScoreOutcome, EngineError> {
        match signals::classify_reaction(emoji) {
            Some(kind) => {
                self.apply_score_event(ScoreEvent {
                    actor_id,
                    target_id,
                    chat_id,
                    kind,
                    event_id,
                })
                .await
            }
            None => {
                tracing::debug!("Ignoring neutral reaction {emoji:?} from {actor_id}");
                Ok(ScoreOutcome::skipped(SkipReason::Rejected {
                    reason: "neutral signal".to_string(),
                }))
            }
        }
    }

    /// Classify a reply message and apply it. Free text never scores.
    pub async fn apply_reply(
        &self,
        actor_id: i64,
        target_id: i64,
        chat_id: i64,
        text: &str,
        event_id: String,
    ) -> Result<ScoreOutcome, EngineError> {
        match signals::classify_reply(text) {
            Some(kind) => {
                self.apply_score_event(ScoreEvent {
                    actor_id,
                    target_id,
                    chat_id,
                    kind,
                    event_id,
                })
                .await
            }
            None => {
                tracing::debug!("Ignoring neutral reply from {actor_id}");
                Ok(ScoreOutcome::skipped(SkipReason::Rejected {
                    reason: "neutral signal".to_string(),
                }))
            }
        }
    }

    fn validate(&self, event: &ScoreEvent) -> Result<(), String> {
        if event.actor_id <= 0 {
            return Err("actor id must be positive".to_string());
        }
        if event.target_id <= 0 {
            return Err("target id must be positive".to_string());
        }
        if event.chat_id == 0 {
            return Err("chat id must be nonzero".to_string());
        }
        if event.event_id.is_empty() {
            return Err("event id must not be empty".to_string());
        }
        if event.actor_id == event.target_id {
            return Err("self-scoring is not allowed".to_string());
        }
        if self.bots.contains(&event.target_id) {
            return Err("bot accounts cannot be scored".to_string());
        }
        Ok(())
    }

    fn finish_score(&self, kind: &ScoreEventKind, outcome: ScoreOutcome) -> ScoreOutcome {
        let result = outcome
            .skipped
            .as_ref()
            .map(|s| s.label())
            .unwrap_or("applied");
        metrics::SCORE_EVENTS_TOTAL
            .with_label_values(&[&kind.to_string(), result])
            .inc();
        outcome
    }

    // ── Throttle checks ───────────────────────────────────────────────

    /// Check a named action for a subject. The ai action switches to the
    /// strict paid policy once the subject's accumulated cost crosses the
    /// threshold.
    pub async fn check_throttle(
        &self,
        action: &str,
        subject_id: i64,
        chat_id: i64,
    ) -> Result<ThrottleOutcome, EngineError> {
        let action = ThrottleAction::parse(action)
            .ok_or_else(|| EngineError::InvalidEvent(format!("unknown action: {action}")))?;
        let now = Utc::now().timestamp();

        if action == ThrottleAction::Ai {
            if let Some(u) = self.db.get_token_usage(subject_id, chat_id).await? {
                let cost = usage::cost_cents(u.input_tokens, u.output_tokens);
                if cost > self.paid_cost_threshold_cents {
                    return Ok(self
                        .throttle
                        .allow_with_policy(PAID_AI_POLICY, subject_id, chat_id, now)
                        .await);
                }
            }
        }

        Ok(self.throttle.allow(action, subject_id, chat_id, now).await)
    }

    // ── Slot machine ──────────────────────────────────────────────────

    /// Spin the reels with the rating as the balance. The stake is taken
    /// up front; winnings come back through the same rating row.
    pub async fn spin(&self, req: SpinRequest) -> Result<SpinOutcome, EngineError> {
        let now = Utc::now().timestamp();

        if req.subject_id <= 0 || req.chat_id == 0 {
            return Ok(self.finish_spin(SpinOutcome::skipped(
                req.stake,
                SkipReason::Rejected {
                    reason: "malformed ids".to_string(),
                },
            )));
        }
        if req.stake <= 0 {
            return Ok(self.finish_spin(SpinOutcome::skipped(
                req.stake,
                SkipReason::Rejected {
                    reason: "stake must be positive".to_string(),
                },
            )));
        }

        match self
            .throttle
            .allow(ThrottleAction::Spin, req.subject_id, req.chat_id, now)
            .await
        {
            ThrottleOutcome::Allowed => {}
            ThrottleOutcome::Denied {
                retry_after_seconds,
            } => {
                return Ok(self.finish_spin(SpinOutcome::skipped(
                    req.stake,
                    SkipReason::Throttled {
                        retry_after_seconds,
                    },
                )));
            }
        }

        if let Some(event_id) = &req.event_id {
            let key = DedupKey {
                actor_id: req.subject_id,
                target_id: req.subject_id,
                event_id: event_id.clone(),
            };
            if self.dedup.check_and_mark(key, Instant::now(), self.dedup_ttl) {
                return Ok(self.finish_spin(SpinOutcome::skipped(req.stake, SkipReason::Duplicate)));
            }
        }

        let balance = self.db.get_rating(req.subject_id, req.chat_id).await?;
        if balance < req.stake {
            return Ok(self.finish_spin(SpinOutcome::skipped(
                req.stake,
                SkipReason::Rejected {
                    reason: "insufficient balance".to_string(),
                },
            )));
        }

        let roll = game::spin(&mut rand::thread_rng(), req.stake);
        let delta = roll.winnings - req.stake;
        let (before, after) = self
            .db
            .increment_rating(req.subject_id, req.chat_id, delta)
            .await?;
        let milestone = self.ranks.milestone(before, after);
        self.db
            .touch_activity(req.subject_id, req.chat_id, now)
            .await?;

        Ok(self.finish_spin(SpinOutcome {
            applied: true,
            symbols: roll.symbols.iter().map(|s| s.to_string()).collect(),
            stake: req.stake,
            winnings: roll.winnings,
            before,
            after,
            milestone,
            skipped: None,
        }))
    }

    fn finish_spin(&self, outcome: SpinOutcome) -> SpinOutcome {
        let result = if !outcome.applied {
            "skipped"
        } else if outcome.winnings > 0 {
            "win"
        } else {
            "lose"
        };
        metrics::SPINS_TOTAL.with_label_values(&[result]).inc();
        outcome
    }

    // ── Token usage ───────────────────────────────────────────────────

    pub async fn record_usage(
        &self,
        user_id: i64,
        chat_id: i64,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<UsageReport, EngineError> {
        if input_tokens < 0 || output_tokens < 0 {
            return Err(EngineError::InvalidEvent(
                "token counts must be non-negative".to_string(),
            ));
        }
        let rec = self
            .db
            .add_token_usage(user_id, chat_id, input_tokens, output_tokens)
            .await?;
        Ok(UsageReport::new(
            rec.user_id,
            rec.chat_id,
            rec.input_tokens,
            rec.output_tokens,
            self.paid_cost_threshold_cents,
        ))
    }

    pub async fn get_usage(&self, user_id: i64, chat_id: i64) -> Result<UsageReport, EngineError> {
        let rec = self.db.get_token_usage(user_id, chat_id).await?;
        let (input, output) = rec
            .map(|r| (r.input_tokens, r.output_tokens))
            .unwrap_or((0, 0));
        Ok(UsageReport::new(
            user_id,
            chat_id,
            input,
            output,
            self.paid_cost_threshold_cents,
        ))
    }

    // ── Administrative ────────────────────────────────────────────────

    pub async fn set_rating(
        &self,
        user_id: i64,
        chat_id: i64,
        rating: i64,
    ) -> Result<(), EngineError> {
        self.db.set_rating(user_id, chat_id, rating).await?;
        Ok(())
    }

    /// Reset every rating in a chat to zero. Returns affected rows.
    pub async fn wipe_chat(&self, chat_id: i64) -> Result<u64, EngineError> {
        let wiped = self.db.wipe_chat(chat_id).await?;
        tracing::info!("Wiped {wiped} ratings in chat {chat_id}");
        Ok(wiped)
    }

    /// Run one decay pass now (also available to operators).
    pub async fn run_decay(&self, now: i64) -> Result<Vec<DecayEntry>, EngineError> {
        decay::run_decay_once(&self.db, self.decay_inactivity_seconds, now).await
    }
}
