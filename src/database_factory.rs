use crate::database::Database;
use crate::date_provider::{DateProvider, FixedDateProvider, OverrideDateProvider, SystemDateProvider};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use std::sync::Arc;

const DEFAULT_DB_PATH: &str = "kotoba_srs.db";

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Whether to use in-memory database
    pub is_test_mode: bool,
    /// Custom database file path (ignored if in test mode)
    pub custom_path: Option<String>,
    /// Calendar date to pretend it is, keeping the time of day
    pub override_date: Option<NaiveDate>,
    /// Exact instant to pretend it is; wins over `override_date`
    pub fixed_now: Option<DateTime<Utc>>,
}

impl DatabaseConfig {
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::default()
    }

    /// Gets the effective database path
    pub fn get_path(&self) -> &str {
        if self.is_test_mode {
            ":memory:"
        } else {
            self.custom_path.as_deref().unwrap_or(DEFAULT_DB_PATH)
        }
    }

    fn date_provider(&self) -> Arc<dyn DateProvider> {
        match (self.fixed_now, self.override_date) {
            (Some(instant), _) => Arc::new(FixedDateProvider::new(instant)),
            (None, Some(date)) => Arc::new(OverrideDateProvider::new(date)),
            (None, None) => Arc::new(SystemDateProvider),
        }
    }
}

#[derive(Debug, Default)]
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    pub fn test_mode(mut self, is_test_mode: bool) -> Self {
        self.config.is_test_mode = is_test_mode;
        self
    }

    pub fn custom_path(mut self, path: Option<String>) -> Self {
        self.config.custom_path = path;
        self
    }

    pub fn date_ymd(mut self, date: Option<NaiveDate>) -> Self {
        self.config.override_date = date;
        self
    }

    pub fn fixed_now(mut self, instant: Option<DateTime<Utc>>) -> Self {
        self.config.fixed_now = instant;
        self
    }

    pub fn build(self) -> DatabaseConfig {
        self.config
    }
}

/// Factory for creating Database instances
pub struct DatabaseFactory;

impl DatabaseFactory {
    /// Creates a database with the specified configuration
    pub fn create(config: DatabaseConfig) -> Result<Database> {
        let path = config.get_path();
        debug!("Opening database at {}", path);
        Database::with_date_provider(path, config.date_provider())
    }
}
