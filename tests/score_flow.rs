// Integration tests for the scoring pipeline: concurrent increments,
// duplicate suppression under racing submissions, throttle persistence
// across engine instances, milestones, spins and the paid ai policy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::future::join_all;

use karma_backend::config::Config;
use karma_backend::db::Database;
use karma_backend::engine::{ReputationEngine, ScoreEvent, SkipReason, SpinRequest};
use karma_backend::rank::RankTier;
use karma_backend::scoring::ScoreEventKind;

static DB_SEQ: AtomicU32 = AtomicU32::new(0);

/// File-backed test database. A memory database would give each pooled
/// connection its own storage, which breaks concurrent access.
fn temp_db_url() -> String {
    let path = std::env::temp_dir().join(format!(
        "karma_test_{}_{}.db",
        std::process::id(),
        DB_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    format!("sqlite:{}?mode=rwc", path.display())
}

async fn test_db(url: &str) -> Arc<Database> {
    Arc::new(Database::new(url).await.unwrap())
}

fn event(actor: i64, target: i64, event_id: &str) -> ScoreEvent {
    ScoreEvent {
        actor_id: actor,
        target_id: target,
        chat_id: -100,
        kind: ScoreEventKind::Positive,
        event_id: event_id.to_string(),
    }
}

// ── Store concurrency ─────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_increments_are_not_lost() {
    let db = test_db(&temp_db_url()).await;

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.increment_rating(1, -100, 1).await.unwrap() })
        })
        .collect();
    for result in join_all(tasks).await {
        result.unwrap();
    }

    assert_eq!(db.get_rating(1, -100).await.unwrap(), 100);
}

#[tokio::test]
async fn test_racing_identical_events_apply_once() {
    let db = test_db(&temp_db_url()).await;
    let mut config = Config::default();
    config.bypass_ids.insert(1);
    let engine = Arc::new(ReputationEngine::new(db.clone(), &config));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .apply_score_event(event(1, 2, "msg-777"))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut applied = 0;
    let mut duplicates = 0;
    for result in join_all(tasks).await {
        let outcome = result.unwrap();
        if outcome.applied {
            applied += 1;
        } else {
            assert_eq!(outcome.skipped, Some(SkipReason::Duplicate));
            duplicates += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(duplicates, 15);
    assert_eq!(engine.get_rating(2, -100).await.unwrap(), 3);
}

// ── Throttle persistence ──────────────────────────────────────────────

#[tokio::test]
async fn test_throttle_counters_survive_engine_restart() {
    let url = temp_db_url();

    {
        let db = test_db(&url).await;
        let engine = ReputationEngine::new(db, &Config::default());
        let outcome = engine.apply_score_event(event(5, 6, "m1")).await.unwrap();
        assert!(outcome.applied);
    }

    // A fresh engine on the same store still sees the spent window.
    let db = test_db(&url).await;
    let engine = ReputationEngine::new(db, &Config::default());
    let outcome = engine.apply_score_event(event(5, 7, "m2")).await.unwrap();
    assert!(!outcome.applied);
    assert!(matches!(
        outcome.skipped,
        Some(SkipReason::Throttled { .. })
    ));
}

// ── End-to-end score flow ─────────────────────────────────────────────

#[tokio::test]
async fn test_score_flow_reports_milestone_and_leaderboard() {
    let db = test_db(&temp_db_url()).await;
    let engine = ReputationEngine::new(db, &Config::default());

    engine.set_rating(2, -100, 595).await.unwrap();
    engine.set_rating(3, -100, 40).await.unwrap();

    // A newcomer praising a veteran: full upward impact.
    let outcome = engine.apply_score_event(event(1, 2, "m1")).await.unwrap();
    assert!(outcome.applied);
    assert_eq!((outcome.before, outcome.after), (595, 601));
    assert_eq!(outcome.milestone, Some(RankTier::Expert));

    let top = engine.leaderboard(-100, 10).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].user_id, 2);
    assert_eq!(top[0].rank, RankTier::Expert);
    assert_eq!((top[1].user_id, top[1].rank), (3, RankTier::Newcomer));
}

// ── Decay ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_decay_pass_spares_active_users() {
    let db = test_db(&temp_db_url()).await;
    let engine = ReputationEngine::new(db.clone(), &Config::default());

    engine.set_rating(1, -100, 400).await.unwrap();
    engine.set_rating(2, -100, 400).await.unwrap();
    db.touch_activity(1, -100, 10_000).await.unwrap();
    db.touch_activity(2, -100, 96_000).await.unwrap();

    // Inactivity cutoff is one day; user 1 is stale, user 2 is not.
    let adjustments = engine.run_decay(10_000 + 86_400).await.unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].user_id, 1);
    assert_eq!(engine.get_rating(1, -100).await.unwrap(), 388);
    assert_eq!(engine.get_rating(2, -100).await.unwrap(), 400);
}

// ── Slot machine ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_spin_conserves_balance_arithmetic() {
    let db = test_db(&temp_db_url()).await;
    let mut config = Config::default();
    config.bypass_ids.insert(9);
    let engine = ReputationEngine::new(db, &config);

    engine.set_rating(9, -100, 1_000).await.unwrap();

    let mut balance = 1_000;
    for i in 0..10 {
        let outcome = engine
            .spin(SpinRequest {
                subject_id: 9,
                chat_id: -100,
                stake: 50,
                event_id: Some(format!("spin-{i}")),
            })
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.before, balance);
        assert_eq!(outcome.after, balance + outcome.winnings - 50);
        // Payouts are whole multiples of the stake.
        assert!(outcome.winnings == 0 || outcome.winnings >= 8 * 50);
        balance = outcome.after;
    }

    assert_eq!(engine.get_rating(9, -100).await.unwrap(), balance);
}

#[tokio::test]
async fn test_spin_rejected_below_stake() {
    let db = test_db(&temp_db_url()).await;
    let mut config = Config::default();
    config.bypass_ids.insert(9);
    let engine = ReputationEngine::new(db, &config);

    engine.set_rating(9, -100, 30).await.unwrap();
    let outcome = engine
        .spin(SpinRequest {
            subject_id: 9,
            chat_id: -100,
            stake: 50,
            event_id: None,
        })
        .await
        .unwrap();
    assert!(!outcome.applied);
    assert_eq!(engine.get_rating(9, -100).await.unwrap(), 30);
}

// ── Paid ai policy ────────────────────────────────────────────────────

#[tokio::test]
async fn test_usage_crossing_threshold_tightens_ai_budget() {
    let db = test_db(&temp_db_url()).await;
    let engine = ReputationEngine::new(db, &Config::default());

    // Two free-tier checks burn into the shared counter.
    let report = engine.record_usage(4, -100, 200_000, 20_000).await.unwrap();
    assert!(!report.paid_limit_active);
    assert!(engine.check_throttle("ai", 4, -100).await.unwrap().is_allowed());
    assert!(engine.check_throttle("ai", 4, -100).await.unwrap().is_allowed());

    // Accumulated spend crosses the paid threshold; the strict policy
    // inherits the counter and denies immediately.
    let report = engine.record_usage(4, -100, 800_000, 60_000).await.unwrap();
    assert!(report.paid_limit_active);
    assert!(!engine.check_throttle("ai", 4, -100).await.unwrap().is_allowed());
}
