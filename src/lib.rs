pub mod admission;
pub mod cli;
pub mod config;
pub mod database;
pub mod database_factory;
pub mod date_provider;
pub mod due_aggregation_service;
pub mod error;
pub mod interval_table;
pub mod item;
pub mod review_session;
pub mod row_factories;
pub mod spaced_repetition;
pub mod study_set;
pub mod time_format;
