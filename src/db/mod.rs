// Database access layer (SQLite via sqlx).
//
// Every read-modify-write goes through a single upsert statement so
// concurrent callers and multiple processes cannot lose updates.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RatingRecord {
    pub user_id: i64,
    pub chat_id: i64,
    pub rating: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ThrottleCounter {
    pub count: i64,
    pub window_started_at: i64,
    pub window_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TokenUsageRecord {
    pub user_id: i64,
    pub chat_id: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ratings (
                user_id BIGINT NOT NULL,
                chat_id BIGINT NOT NULL,
                rating BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, chat_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS throttle_counters (
                key TEXT PRIMARY KEY,
                count BIGINT NOT NULL DEFAULT 0,
                window_started_at BIGINT NOT NULL,
                window_seconds BIGINT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activity (
                user_id BIGINT NOT NULL,
                chat_id BIGINT NOT NULL,
                last_seen_at BIGINT NOT NULL,
                PRIMARY KEY (user_id, chat_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS token_usage (
                user_id BIGINT NOT NULL,
                chat_id BIGINT NOT NULL,
                input_tokens BIGINT NOT NULL DEFAULT 0,
                output_tokens BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, chat_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Ratings ───────────────────────────────────────────────────────

    /// Current rating; 0 when the user has no row yet.
    pub async fn get_rating(&self, user_id: i64, chat_id: i64) -> Result<i64, sqlx::Error> {
        let rating: Option<i64> =
            sqlx::query_scalar("SELECT rating FROM ratings WHERE user_id = ? AND chat_id = ?")
                .bind(user_id)
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(rating.unwrap_or(0))
    }

    /// Atomically add `delta` (may be negative), creating the row on first
    /// touch. Returns (before, after).
    pub async fn increment_rating(
        &self,
        user_id: i64,
        chat_id: i64,
        delta: i64,
    ) -> Result<(i64, i64), sqlx::Error> {
        let after: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ratings (user_id, chat_id, rating) VALUES (?, ?, ?)
            ON CONFLICT(user_id, chat_id)
                DO UPDATE SET rating = ratings.rating + excluded.rating
            RETURNING rating
        "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(delta)
        .fetch_one(&self.pool)
        .await?;
        Ok((after - delta, after))
    }

    /// Set an absolute rating value (administrative).
    pub async fn set_rating(
        &self,
        user_id: i64,
        chat_id: i64,
        rating: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO ratings (user_id, chat_id, rating) VALUES (?, ?, ?)
            ON CONFLICT(user_id, chat_id) DO UPDATE SET rating = excluded.rating
        "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(rating)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Top `n` ratings in a chat, highest first; ties break on user id so
    /// the order is stable.
    pub async fn top_ratings(
        &self,
        chat_id: i64,
        n: i64,
    ) -> Result<Vec<RatingRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RatingRecord>(
            "SELECT user_id, chat_id, rating FROM ratings WHERE chat_id = ? ORDER BY rating DESC, user_id ASC LIMIT ?",
        )
        .bind(chat_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Reset every rating in a chat to zero. Returns affected rows.
    pub async fn wipe_chat(&self, chat_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE ratings SET rating = 0 WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Chats that have at least one rating row.
    pub async fn list_chats(&self) -> Result<Vec<i64>, sqlx::Error> {
        let rows: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT chat_id FROM ratings ORDER BY chat_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // ── Throttle counters ─────────────────────────────────────────────

    /// Bump the fixed-window counter behind `key` and return its state.
    ///
    /// An expired window is re-armed at `now` with this call as its first
    /// hit; a live window keeps its start. The counter clamps at
    /// `max_times + 1`, enough to signal denial without overflow risk
    /// under a flood. Callers allow iff the returned count <= max_times.
    pub async fn bump_throttle_counter(
        &self,
        key: &str,
        now: i64,
        window_seconds: i64,
        max_times: i64,
    ) -> Result<ThrottleCounter, sqlx::Error> {
        let counter = sqlx::query_as::<_, ThrottleCounter>(
            r#"
            INSERT INTO throttle_counters (key, count, window_started_at, window_seconds)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                count = CASE
                    WHEN throttle_counters.window_started_at + throttle_counters.window_seconds
                         <= excluded.window_started_at
                        THEN 1
                    WHEN throttle_counters.count > ?
                        THEN throttle_counters.count
                    ELSE throttle_counters.count + 1
                END,
                window_started_at = CASE
                    WHEN throttle_counters.window_started_at + throttle_counters.window_seconds
                         <= excluded.window_started_at
                        THEN excluded.window_started_at
                    ELSE throttle_counters.window_started_at
                END,
                window_seconds = CASE
                    WHEN throttle_counters.window_started_at + throttle_counters.window_seconds
                         <= excluded.window_started_at
                        THEN excluded.window_seconds
                    ELSE throttle_counters.window_seconds
                END
            RETURNING count, window_started_at, window_seconds
        "#,
        )
        .bind(key)
        .bind(now)
        .bind(window_seconds)
        .bind(max_times)
        .fetch_one(&self.pool)
        .await?;
        Ok(counter)
    }

    // ── Activity ──────────────────────────────────────────────────────

    /// Record that a user was active in a chat at `now` (unix seconds).
    pub async fn touch_activity(
        &self,
        user_id: i64,
        chat_id: i64,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO activity (user_id, chat_id, last_seen_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id, chat_id) DO UPDATE SET last_seen_at = excluded.last_seen_at
        "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn last_seen(&self, user_id: i64, chat_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let seen: Option<i64> = sqlx::query_scalar(
            "SELECT last_seen_at FROM activity WHERE user_id = ? AND chat_id = ?",
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(seen)
    }

    // ── Token usage ───────────────────────────────────────────────────

    /// Accumulate token counts for a (user, chat) pair and return the new
    /// totals.
    pub async fn add_token_usage(
        &self,
        user_id: i64,
        chat_id: i64,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<TokenUsageRecord, sqlx::Error> {
        let record = sqlx::query_as::<_, TokenUsageRecord>(
            r#"
            INSERT INTO token_usage (user_id, chat_id, input_tokens, output_tokens)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, chat_id) DO UPDATE SET
                input_tokens = token_usage.input_tokens + excluded.input_tokens,
                output_tokens = token_usage.output_tokens + excluded.output_tokens
            RETURNING user_id, chat_id, input_tokens, output_tokens
        "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(input_tokens)
        .bind(output_tokens)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn get_token_usage(
        &self,
        user_id: i64,
        chat_id: i64,
    ) -> Result<Option<TokenUsageRecord>, sqlx::Error> {
        let record = sqlx::query_as::<_, TokenUsageRecord>(
            "SELECT user_id, chat_id, input_tokens, output_tokens FROM token_usage WHERE user_id = ? AND chat_id = ?",
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Clear accumulated usage (e.g. after payment). Returns whether a row
    /// existed.
    pub async fn reset_token_usage(&self, user_id: i64, chat_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM token_usage WHERE user_id = ? AND chat_id = ?")
            .bind(user_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_rating_absent_reads_zero() {
        let db = test_db().await;
        assert_eq!(db.get_rating(1, -100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_creates_and_accumulates() {
        let db = test_db().await;

        let (before, after) = db.increment_rating(1, -100, 5).await.unwrap();
        assert_eq!((before, after), (0, 5));

        let (before, after) = db.increment_rating(1, -100, 3).await.unwrap();
        assert_eq!((before, after), (5, 8));

        let (before, after) = db.increment_rating(1, -100, -10).await.unwrap();
        assert_eq!((before, after), (8, -2));
        assert_eq!(db.get_rating(1, -100).await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_ratings_scoped_per_chat() {
        let db = test_db().await;

        db.increment_rating(1, -100, 7).await.unwrap();
        db.increment_rating(1, -200, 2).await.unwrap();

        assert_eq!(db.get_rating(1, -100).await.unwrap(), 7);
        assert_eq!(db.get_rating(1, -200).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_set_rating_overwrites() {
        let db = test_db().await;

        db.set_rating(1, -100, 42).await.unwrap();
        assert_eq!(db.get_rating(1, -100).await.unwrap(), 42);

        db.set_rating(1, -100, 10).await.unwrap();
        assert_eq!(db.get_rating(1, -100).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_top_ratings_order_and_ties() {
        let db = test_db().await;

        db.set_rating(1, -100, 50).await.unwrap();
        db.set_rating(2, -100, 80).await.unwrap();
        db.set_rating(3, -100, 50).await.unwrap();
        db.set_rating(4, -100, 10).await.unwrap();
        db.set_rating(9, -999, 1000).await.unwrap();

        let top = db.top_ratings(-100, 3).await.unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].user_id, 2);
        // Equal ratings order by user id.
        assert_eq!(top[1].user_id, 1);
        assert_eq!(top[2].user_id, 3);

        let all = db.top_ratings(-100, 10).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_wipe_chat_resets_to_zero() {
        let db = test_db().await;

        db.set_rating(1, -100, 50).await.unwrap();
        db.set_rating(2, -100, 80).await.unwrap();
        db.set_rating(3, -200, 30).await.unwrap();

        let wiped = db.wipe_chat(-100).await.unwrap();
        assert_eq!(wiped, 2);

        assert_eq!(db.get_rating(1, -100).await.unwrap(), 0);
        assert_eq!(db.get_rating(2, -100).await.unwrap(), 0);
        // Other chats untouched.
        assert_eq!(db.get_rating(3, -200).await.unwrap(), 30);

        // Rows survive the wipe.
        let all = db.top_ratings(-100, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_list_chats() {
        let db = test_db().await;
        assert!(db.list_chats().await.unwrap().is_empty());

        db.set_rating(1, -100, 5).await.unwrap();
        db.set_rating(2, -100, 5).await.unwrap();
        db.set_rating(1, -200, 5).await.unwrap();

        assert_eq!(db.list_chats().await.unwrap(), vec![-200, -100]);
    }

    #[tokio::test]
    async fn test_throttle_counter_counts_within_window() {
        let db = test_db().await;
        let now = 1_700_000_000;

        let c1 = db.bump_throttle_counter("score:1", now, 30, 1).await.unwrap();
        assert_eq!(c1.count, 1);
        assert_eq!(c1.window_started_at, now);
        assert_eq!(c1.window_seconds, 30);

        let c2 = db.bump_throttle_counter("score:1", now + 5, 30, 1).await.unwrap();
        assert_eq!(c2.count, 2);
        // Window start does not move inside a live window.
        assert_eq!(c2.window_started_at, now);
    }

    #[tokio::test]
    async fn test_throttle_counter_clamps() {
        let db = test_db().await;
        let now = 1_700_000_000;

        for _ in 0..10 {
            db.bump_throttle_counter("ai:7", now, 300, 5).await.unwrap();
        }
        let c = db.bump_throttle_counter("ai:7", now + 1, 300, 5).await.unwrap();
        // Clamped one past the limit, not 11.
        assert_eq!(c.count, 6);
    }

    #[tokio::test]
    async fn test_throttle_counter_rearms_after_expiry() {
        let db = test_db().await;
        let now = 1_700_000_000;

        db.bump_throttle_counter("score:1", now, 30, 1).await.unwrap();
        db.bump_throttle_counter("score:1", now + 1, 30, 1).await.unwrap();

        // Window [now, now+30) has expired at now+30.
        let c = db.bump_throttle_counter("score:1", now + 30, 30, 1).await.unwrap();
        assert_eq!(c.count, 1);
        assert_eq!(c.window_started_at, now + 30);
    }

    #[tokio::test]
    async fn test_throttle_counter_keys_independent() {
        let db = test_db().await;
        let now = 1_700_000_000;

        db.bump_throttle_counter("score:1", now, 30, 1).await.unwrap();
        let other = db.bump_throttle_counter("score:2", now, 30, 1).await.unwrap();
        assert_eq!(other.count, 1);
    }

    #[tokio::test]
    async fn test_activity_roundtrip() {
        let db = test_db().await;

        assert_eq!(db.last_seen(1, -100).await.unwrap(), None);

        db.touch_activity(1, -100, 1000).await.unwrap();
        assert_eq!(db.last_seen(1, -100).await.unwrap(), Some(1000));

        db.touch_activity(1, -100, 2000).await.unwrap();
        assert_eq!(db.last_seen(1, -100).await.unwrap(), Some(2000));
    }

    #[tokio::test]
    async fn test_token_usage_accumulates() {
        let db = test_db().await;

        assert!(db.get_token_usage(1, -100).await.unwrap().is_none());

        let u = db.add_token_usage(1, -100, 1000, 200).await.unwrap();
        assert_eq!(u.input_tokens, 1000);
        assert_eq!(u.output_tokens, 200);

        let u = db.add_token_usage(1, -100, 500, 100).await.unwrap();
        assert_eq!(u.input_tokens, 1500);
        assert_eq!(u.output_tokens, 300);

        assert!(db.reset_token_usage(1, -100).await.unwrap());
        assert!(!db.reset_token_usage(1, -100).await.unwrap());
        assert!(db.get_token_usage(1, -100).await.unwrap().is_none());
    }
}
