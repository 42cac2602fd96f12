use std::time::Duration;

/// Errors surfaced by the scheduling services
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Daily cap must be positive, got {0}")]
    InvalidCap(i64),

    #[error("Requested count must not be negative, got {0}")]
    InvalidRequestedCount(i64),

    #[error("Unknown item kind '{0}', expected 'vocabulary' or 'grammar'")]
    UnknownKind(String),

    #[error("Unknown review outcome '{0}', expected 'correct' or 'incorrect'")]
    UnknownOutcome(String),

    #[error("Invalid interval table: {0}")]
    InvalidIntervalTable(String),

    #[error("Invalid timezone '{0}', expected a zone name such as Asia/Tokyo, Z or +HH:MM")]
    InvalidTimezone(String),

    #[error("Set {0} not found")]
    SetNotFound(i64),

    #[error("Item {0} not found")]
    ItemNotFound(i64),

    #[error("Fetching set {set_id} timed out after {timeout:?}")]
    FetchTimeout { set_id: i64, timeout: Duration },

    #[error("Listing sets of owner '{owner_id}' timed out after {timeout:?}")]
    OwnerTimeout { owner_id: String, timeout: Duration },

    #[error("Item {0} has no incorrect answer in this session to retract")]
    NothingToRetract(i64),

    #[error("Item {item_id} already entered the review cycle (level {level})")]
    AlreadyInCycle { item_id: i64, level: i64 },

    #[error("Invalid item content: {0}")]
    Content(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
