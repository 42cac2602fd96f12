use crate::row_factories::{SrsRecordRowFactory, to_db_timestamp};
use crate::spaced_repetition::SrsRecord;
use log::debug;
use rusqlite::{Connection, Result, params};

pub struct SrsRecordsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SrsRecordsRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SrsRecordsRepository { conn }
    }

    pub fn get(&self, item_id: i64, scope: &str) -> Result<Option<SrsRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, scope, level, time_created
             FROM srs_records WHERE item_id = ?1 AND scope = ?2",
        )?;

        let mut rows = stmt.query(params![item_id, scope])?;

        if let Some(row) = rows.next()? {
            Ok(Some(SrsRecordRowFactory::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Writes the record for its (item, scope); last write wins
    pub fn upsert(&self, record: &SrsRecord) -> Result<()> {
        debug!(
            "Writing SRS record item_id={} scope='{}' level={:?}",
            record.item_id, record.scope, record.level
        );
        self.conn.execute(
            "INSERT INTO srs_records (item_id, scope, level, time_created)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (item_id, scope) DO UPDATE SET
                 level = excluded.level,
                 time_created = excluded.time_created",
            params![
                record.item_id,
                record.scope,
                record.level,
                record.time_created.map(to_db_timestamp)
            ],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM srs_records", [], |row| row.get(0))?;
        Ok(count)
    }
}
