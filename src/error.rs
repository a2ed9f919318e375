// Engine error taxonomy.
//
// Duplicate suppression and throttling are normal outcomes, not errors;
// they are reported through ScoreOutcome/ThrottleOutcome. Only genuine
// failures live here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The rating store could not be reached or a statement failed.
    /// Callers must not substitute defaults for failed writes.
    #[error("rating store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// The request itself is malformed: unknown action key, bad payload.
    #[error("invalid request: {0}")]
    InvalidEvent(String),
}
