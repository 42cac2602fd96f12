use crate::item::{ItemKind, LearnableItem};
use crate::spaced_repetition::SrsRecord;
use crate::study_set::StudySet;
use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use rusqlite::Row;
use rusqlite::types::{Type, ValueRef};
use serde_json::{Map, Value};

/// Formats a timestamp for storage.
///
/// Fixed precision and the `Z` suffix keep lexical order equal to
/// chronological order, which the range queries rely on.
pub fn to_db_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp; anything unparseable reads as absent
pub fn from_db_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring malformed timestamp '{}': {}", raw, e);
            None
        }
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

/// Factory for creating StudySet objects from database rows
pub struct StudySetRowFactory;

impl StudySetRowFactory {
    /// Expected columns: id, owner_id, title, srs_enabled, created_at
    pub fn from_row(row: &Row) -> rusqlite::Result<StudySet> {
        let raw_created_at: String = row.get(4)?;
        let created_at = DateTime::parse_from_rfc3339(&raw_created_at)
            .map_err(|e| conversion_error(4, e.to_string()))?
            .with_timezone(&Utc);

        Ok(StudySet {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            srs_enabled: row.get::<_, i64>(3)? != 0,
            created_at,
        })
    }
}

/// Factory for creating LearnableItem objects from database rows
pub struct LearnableItemRowFactory;

impl LearnableItemRowFactory {
    /// Expected columns: id, kind, owner_id, content
    pub fn from_row(row: &Row) -> rusqlite::Result<LearnableItem> {
        let raw_kind: String = row.get(1)?;
        let kind = ItemKind::from(&raw_kind)
            .ok_or_else(|| conversion_error(1, format!("unknown item kind '{}'", raw_kind)))?;

        let raw_content: String = row.get(3)?;
        let content = match serde_json::from_str::<Value>(&raw_content) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => Map::new(),
            Err(e) => return Err(conversion_error(3, e.to_string())),
        };

        Ok(LearnableItem {
            id: row.get(0)?,
            kind,
            owner_id: row.get(2)?,
            content,
        })
    }
}

/// Factory for creating SrsRecord objects from database rows
pub struct SrsRecordRowFactory;

impl SrsRecordRowFactory {
    /// Expected columns: item_id, scope, level, time_created
    pub fn from_row(row: &Row) -> rusqlite::Result<SrsRecord> {
        Self::from_columns(row, 0)
    }

    /// Reads a record from a joined row; `item_id` and `scope` start at
    /// `offset`. Returns `None` when the join found no record.
    pub fn optional_from_row(row: &Row, offset: usize) -> rusqlite::Result<Option<SrsRecord>> {
        match row.get::<_, Option<i64>>(offset)? {
            Some(_) => Self::from_columns(row, offset).map(Some),
            None => Ok(None),
        }
    }

    fn from_columns(row: &Row, offset: usize) -> rusqlite::Result<SrsRecord> {
        let item_id: i64 = row.get(offset)?;
        let raw_time: Option<String> = match row.get_ref(offset + 3)? {
            ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Null => None,
            other => {
                warn!("Ignoring non-text time_created of item {}: {:?}", item_id, other.data_type());
                None
            }
        };

        Ok(SrsRecord {
            item_id,
            scope: row.get(offset + 1)?,
            level: level_from_column(item_id, row.get_ref(offset + 2)?),
            time_created: from_db_timestamp(raw_time),
        })
    }
}

/// Stored levels are only trusted when SQLite holds them as integers
fn level_from_column(item_id: i64, value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(level) => Some(level),
        ValueRef::Null => None,
        other => {
            warn!(
                "Ignoring malformed level of item {}: {:?} value",
                item_id,
                other.data_type()
            );
            None
        }
    }
}

/// True for errors caused by a row's content rather than by the database
pub fn is_malformed_row(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::Utf8Error(..)
    )
}
