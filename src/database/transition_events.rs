use crate::item::ItemKind;
use crate::row_factories::{from_db_timestamp, to_db_timestamp};
use crate::spaced_repetition::{Outcome, Transition};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{Connection, Result, params};

/// Append-only log of persisted level transitions
pub struct TransitionEventsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> TransitionEventsRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        TransitionEventsRepository { conn }
    }

    pub fn insert(&self, transition: &Transition) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO srs_events (item_id, scope, previous_level, new_level, outcome, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                transition.item_id,
                transition.scope,
                transition.previous_level,
                transition.new_level,
                transition.outcome.as_str(),
                to_db_timestamp(transition.occurred_at)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Replaces the result of a logged transition in place
    pub fn amend(&self, event_id: i64, transition: &Transition) -> Result<()> {
        self.conn.execute(
            "UPDATE srs_events
             SET new_level = ?1, outcome = ?2, occurred_at = ?3
             WHERE id = ?4",
            params![
                transition.new_level,
                transition.outcome.as_str(),
                to_db_timestamp(transition.occurred_at),
                event_id
            ],
        )?;
        Ok(())
    }

    pub fn list_for_item(&self, item_id: i64, scope: &str) -> Result<Vec<Transition>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, scope, previous_level, new_level, outcome, occurred_at
             FROM srs_events
             WHERE item_id = ?1 AND scope = ?2
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![item_id, scope], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut transitions = Vec::new();
        for row in rows {
            let (item_id, scope, previous_level, new_level, outcome, occurred_at) = row?;
            let (Some(outcome), Some(occurred_at)) =
                (Outcome::from(&outcome), from_db_timestamp(Some(occurred_at)))
            else {
                debug!("Skipping unreadable transition event for item {}", item_id);
                continue;
            };
            transitions.push(Transition {
                item_id,
                scope,
                previous_level,
                new_level,
                outcome,
                occurred_at,
            });
        }
        Ok(transitions)
    }

    /// Counts items of a set and kind that left the unseen level within
    /// `[start, end)`
    pub fn count_first_entries(
        &self,
        set_id: i64,
        kind: ItemKind,
        scope: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT e.item_id)
             FROM srs_events e
             JOIN set_items si ON si.item_id = e.item_id
             JOIN items i ON i.id = e.item_id
             WHERE si.set_id = ?1
               AND i.kind = ?2
               AND e.scope = ?3
               AND e.previous_level = 0
               AND e.new_level >= 1
               AND e.occurred_at >= ?4
               AND e.occurred_at < ?5",
            params![
                set_id,
                kind.as_str(),
                scope,
                to_db_timestamp(start),
                to_db_timestamp(end)
            ],
            |row| row.get(0),
        )?;
        debug!(
            "Set {} has {} first entries ({}, scope '{}') between {} and {}",
            set_id, count, kind, scope, start, end
        );
        Ok(count)
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM srs_events", [], |row| row.get(0))?;
        Ok(count)
    }
}
