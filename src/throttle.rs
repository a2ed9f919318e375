// Fixed-window throttling for sensitive bot actions.
//
// Counters live in the store so every bot process sees the same state.
// Policies are data: per-action window, cap, scope and failure behavior.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::db::Database;

/// Actions the bot throttles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleAction {
    /// Applying a score event.
    Score,
    /// Requesting the leaderboard.
    Leaderboard,
    /// An AI conversation turn.
    Ai,
    /// Summarizing chat history (shared per chat).
    History,
    /// Entertainment commands.
    Fun,
    /// A slot machine spin.
    Spin,
}

impl ThrottleAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "score" => Some(ThrottleAction::Score),
            "leaderboard" => Some(ThrottleAction::Leaderboard),
            "ai" => Some(ThrottleAction::Ai),
            "history" => Some(ThrottleAction::History),
            "fun" => Some(ThrottleAction::Fun),
            "spin" => Some(ThrottleAction::Spin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThrottleAction::Score => "score",
            ThrottleAction::Leaderboard => "leaderboard",
            ThrottleAction::Ai => "ai",
            ThrottleAction::History => "history",
            ThrottleAction::Fun => "fun",
            ThrottleAction::Spin => "spin",
        }
    }

    /// The limits this action runs under.
    pub fn policy(self) -> ThrottlePolicy {
        match self {
            ThrottleAction::Score => ThrottlePolicy {
                key: "score",
                window_seconds: 30,
                max_times: 1,
                chat_scoped: false,
                fail_open: false,
            },
            ThrottleAction::Leaderboard => ThrottlePolicy {
                key: "leaderboard",
                window_seconds: 30,
                max_times: 1,
                chat_scoped: false,
                fail_open: true,
            },
            ThrottleAction::Ai => ThrottlePolicy {
                key: "ai",
                window_seconds: 300,
                max_times: 5,
                chat_scoped: false,
                fail_open: false,
            },
            ThrottleAction::History => ThrottlePolicy {
                key: "history",
                window_seconds: 600,
                max_times: 1,
                chat_scoped: true,
                fail_open: false,
            },
            ThrottleAction::Fun => ThrottlePolicy {
                key: "fun",
                window_seconds: 60,
                max_times: 1,
                chat_scoped: false,
                fail_open: true,
            },
            ThrottleAction::Spin => ThrottlePolicy {
                key: "spin",
                window_seconds: 1,
                max_times: 2,
                chat_scoped: false,
                fail_open: false,
            },
        }
    }
}

impl std::fmt::Display for ThrottleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Limits for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Counter key prefix.
    pub key: &'static str,
    pub window_seconds: i64,
    /// Passes allowed per window.
    pub max_times: i64,
    /// Shared counter per chat instead of per subject.
    pub chat_scoped: bool,
    /// On store failure: allow (true) or deny (false). Never panics.
    pub fail_open: bool,
}

/// Strict policy substituted for paying AI users.
pub const PAID_AI_POLICY: ThrottlePolicy = ThrottlePolicy {
    key: "ai",
    window_seconds: 600,
    max_times: 1,
    chat_scoped: false,
    fail_open: false,
};

/// Decision for one action attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleOutcome {
    Allowed,
    Denied { retry_after_seconds: i64 },
}

impl ThrottleOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleOutcome::Allowed)
    }
}

/// Store-backed guard shared by every caller.
#[derive(Clone)]
pub struct ThrottleGuard {
    db: Arc<Database>,
    bypass: Arc<HashSet<i64>>,
}

impl ThrottleGuard {
    pub fn new(db: Arc<Database>, bypass: HashSet<i64>) -> Self {
        Self {
            db,
            bypass: Arc::new(bypass),
        }
    }

    /// Check and record one attempt under the action's own policy.
    /// `now` is unix seconds.
    pub async fn allow(
        &self,
        action: ThrottleAction,
        subject_id: i64,
        chat_id: i64,
        now: i64,
    ) -> ThrottleOutcome {
        self.allow_with_policy(action.policy(), subject_id, chat_id, now)
            .await
    }

    /// Check under an explicit policy; the paid-ai substitution uses this.
    /// Bypassed subjects and local mode skip the counter entirely.
    pub async fn allow_with_policy(
        &self,
        policy: ThrottlePolicy,
        subject_id: i64,
        chat_id: i64,
        now: i64,
    ) -> ThrottleOutcome {
        if crate::config::is_local_mode() || self.bypass.contains(&subject_id) {
            return ThrottleOutcome::Allowed;
        }

        let scope_id = if policy.chat_scoped { chat_id } else { subject_id };
        let key = format!("{}:{}", policy.key, scope_id);

        match self
            .db
            .bump_throttle_counter(&key, now, policy.window_seconds, policy.max_times)
            .await
        {
            Ok(counter) => {
                if counter.count <= policy.max_times {
                    crate::metrics::THROTTLE_CHECKS_TOTAL
                        .with_label_values(&[policy.key, "allowed"])
                        .inc();
                    ThrottleOutcome::Allowed
                } else {
                    let retry_after =
                        (counter.window_started_at + counter.window_seconds - now).max(0);
                    crate::metrics::THROTTLE_CHECKS_TOTAL
                        .with_label_values(&[policy.key, "denied"])
                        .inc();
                    ThrottleOutcome::Denied {
                        retry_after_seconds: retry_after,
                    }
                }
            }
            Err(e) => {
                if policy.fail_open {
                    tracing::warn!("Throttle store error, allowing {key}: {e}");
                    ThrottleOutcome::Allowed
                } else {
                    tracing::warn!("Throttle store error, denying {key}: {e}");
                    ThrottleOutcome::Denied {
                        retry_after_seconds: policy.window_seconds,
                    }
                }
            }
        }
    }
}
