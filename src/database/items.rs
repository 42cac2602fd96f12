use crate::item::{ItemKind, ItemWithSrs, LearnableItem};
use crate::row_factories::{LearnableItemRowFactory, SrsRecordRowFactory, is_malformed_row, to_db_timestamp};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rusqlite::{Connection, Result, Row, params};
use serde_json::{Map, Value};

pub struct ItemsRepository<'a> {
    conn: &'a Connection,
    get_current_time: Box<dyn Fn() -> DateTime<Utc> + 'a>,
}

impl<'a> ItemsRepository<'a> {
    pub fn new(
        conn: &'a Connection,
        get_current_time: Box<dyn Fn() -> DateTime<Utc> + 'a>,
    ) -> Self {
        ItemsRepository {
            conn,
            get_current_time,
        }
    }

    pub fn insert(&self, owner_id: &str, kind: ItemKind, content: &Map<String, Value>) -> Result<i64> {
        let now_utc = to_db_timestamp((self.get_current_time)());
        let content_json = Value::Object(content.clone()).to_string();
        self.conn.execute(
            "INSERT INTO items (owner_id, kind, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, kind.as_str(), content_json, now_utc],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get(&self, item_id: i64) -> Result<Option<LearnableItem>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, kind, owner_id, content FROM items WHERE id = ?1")?;

        let mut rows = stmt.query([item_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(LearnableItemRowFactory::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Appends an item at the end of a set; adding it twice is a no-op
    pub fn add_to_set(&self, set_id: i64, item_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO set_items (set_id, item_id, position)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM set_items WHERE set_id = ?1))",
            params![set_id, item_id],
        )?;
        Ok(())
    }

    pub fn remove_from_set(&self, set_id: i64, item_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM set_items WHERE set_id = ?1 AND item_id = ?2",
            params![set_id, item_id],
        )?;
        Ok(())
    }

    /// Items of a set in set order, each with its record for `scope`
    pub fn list_with_srs(&self, set_id: i64, scope: &str) -> Result<Vec<ItemWithSrs>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.kind, i.owner_id, i.content,
                    r.item_id, r.scope, r.level, r.time_created
             FROM set_items si
             JOIN items i ON i.id = si.item_id
             LEFT JOIN srs_records r ON r.item_id = i.id AND r.scope = ?2
             WHERE si.set_id = ?1
             ORDER BY si.position ASC",
        )?;

        let rows = stmt.query_map(params![set_id, scope], item_with_srs_from_row)?;
        let items = collect_readable(rows, set_id)?;

        debug!("Loaded {} items of set {} (scope '{}')", items.len(), set_id, scope);
        Ok(items)
    }

    /// Items of a set that have not entered the review cycle for `scope`,
    /// in set order
    pub fn list_unseen(
        &self,
        set_id: i64,
        scope: &str,
        kind: Option<ItemKind>,
        limit: usize,
    ) -> Result<Vec<ItemWithSrs>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.kind, i.owner_id, i.content,
                    r.item_id, r.scope, r.level, r.time_created
             FROM set_items si
             JOIN items i ON i.id = si.item_id
             LEFT JOIN srs_records r ON r.item_id = i.id AND r.scope = ?2
             WHERE si.set_id = ?1
               AND (r.item_id IS NULL OR typeof(r.level) <> 'integer' OR r.level = 0)
               AND (?3 IS NULL OR i.kind = ?3)
             ORDER BY si.position ASC
             LIMIT ?4",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![set_id, scope, kind.map(|k| k.as_str().to_string()), limit],
            item_with_srs_from_row,
        )?;
        collect_readable(rows, set_id)
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Collects rows, skipping the ones whose stored values cannot be read
fn collect_readable(
    rows: impl Iterator<Item = Result<ItemWithSrs>>,
    set_id: i64,
) -> Result<Vec<ItemWithSrs>> {
    let mut items = Vec::new();
    for item in rows {
        match item {
            Ok(item) => items.push(item),
            Err(e) if is_malformed_row(&e) => {
                warn!("Skipping unreadable item row in set {}: {}", set_id, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(items)
}

fn item_with_srs_from_row(row: &Row) -> Result<ItemWithSrs> {
    Ok(ItemWithSrs {
        item: LearnableItemRowFactory::from_row(row)?,
        srs: SrsRecordRowFactory::optional_from_row(row, 4)?,
    })
}
