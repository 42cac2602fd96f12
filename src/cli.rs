use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Spaced-repetition scheduler for Japanese vocabulary and grammar sets
#[derive(Parser, Debug, Clone)]
#[command(name = "kotoba-srs")]
#[command(about = "Query and drive spaced-repetition reviews", long_about = None)]
#[command(version)]
pub struct Args {
    /// Use in-memory database for testing
    #[arg(long, global = true, help = "Use in-memory database for testing")]
    pub test: bool,

    /// Custom database file path
    #[arg(long, global = true, value_name = "PATH", help = "Use custom database file path")]
    pub db_path: Option<PathBuf>,

    /// Override current date for testing (YYYY-MM-DD format)
    #[arg(
        long,
        global = true,
        value_name = "DATE",
        help = "Override current date (YYYY-MM-DD format)"
    )]
    pub override_date: Option<String>,

    /// Pin the current instant (RFC 3339), wins over --override-date
    #[arg(long, global = true, value_name = "INSTANT")]
    pub now: Option<String>,

    /// Review scope to work in
    #[arg(long, global = true, value_name = "SCOPE")]
    pub scope: Option<String>,

    /// Sets fetched at once while aggregating due items
    #[arg(long, global = true, default_value_t = 8)]
    pub max_concurrency: usize,

    /// Budget for fetching one set, in milliseconds
    #[arg(long, global = true, default_value_t = 5000)]
    pub fetch_timeout_ms: u64,

    /// Print human-readable text instead of JSON
    #[arg(long, global = true)]
    pub text: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Due items across all SRS-enabled sets of an owner
    Due {
        owner: String,
        /// Only report counts
        #[arg(long)]
        count_only: bool,
    },
    /// Due items of one set
    DueSet { set_id: i64 },
    /// Unseen items of a set that could be introduced
    LearnNew {
        set_id: i64,
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Remaining learn-new quota of a set for today
    Quota {
        set_id: i64,
        #[arg(long, value_name = "KIND")]
        kind: String,
        /// Daily cap of new items
        #[arg(long, allow_negative_numbers = true)]
        cap: i64,
        /// Number of new items to admit
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        requested: i64,
        /// Zone of the learner's day (Asia/Tokyo, Z, +09:00, -05:00)
        #[arg(long, default_value = "Z", allow_hyphen_values = true)]
        timezone: String,
    },
    /// Apply one review outcome to an item
    Review { item_id: i64, outcome: String },
    /// Run a review session over the due items of a set
    Session {
        set_id: i64,
        /// Answers in order: correct, incorrect or retract
        answers: Vec<String>,
    },
    /// Move an unseen item into the review cycle
    Enter { item_id: i64 },
    /// Create a study set
    CreateSet {
        owner: String,
        title: String,
        /// Create the set with SRS disabled
        #[arg(long)]
        no_srs: bool,
    },
    /// Create an item, optionally adding it to a set
    AddItem {
        owner: String,
        #[arg(long, value_name = "KIND")]
        kind: String,
        /// Content fields as a JSON object
        #[arg(long, default_value = "{}")]
        content: String,
        #[arg(long, value_name = "SET_ID")]
        set: Option<i64>,
    },
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate the override_date argument if provided
    pub fn validate_override_date(&self) -> Result<Option<NaiveDate>, String> {
        match &self.override_date {
            Some(date_str) => NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| {
                    format!(
                        "Invalid date format for --override-date: '{}'. Expected YYYY-MM-DD",
                        date_str
                    )
                }),
            None => Ok(None),
        }
    }

    /// Validate the now argument if provided
    pub fn validate_now(&self) -> Result<Option<DateTime<Utc>>, String> {
        match &self.now {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|instant| Some(instant.with_timezone(&Utc)))
                .map_err(|_| {
                    format!(
                        "Invalid instant for --now: '{}'. Expected RFC 3339, e.g. 2025-01-15T12:00:00Z",
                        raw
                    )
                }),
            None => Ok(None),
        }
    }
}
