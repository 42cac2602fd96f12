use crate::error::{Result, SchedulerError};
use log::debug;
use rusqlite::Connection;

// Embed migrations from the migrations directory
refinery::embed_migrations!("migrations");

/// Opens the database and brings its schema up to date
pub fn init_connection(db_path: &str) -> Result<Connection> {
    let mut conn = Connection::open(db_path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let report = migrations::runner()
        .run(&mut conn)
        .map_err(|e| SchedulerError::Migration(e.to_string()))?;
    debug!(
        "Migrations completed successfully ({} applied)",
        report.applied_migrations().len()
    );

    Ok(conn)
}
