use crate::row_factories::{StudySetRowFactory, to_db_timestamp};
use crate::study_set::StudySet;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Result, params};

const SET_COLUMNS: &str = "id, owner_id, title, srs_enabled, created_at";

pub struct SetsRepository<'a> {
    conn: &'a Connection,
    get_current_time: Box<dyn Fn() -> DateTime<Utc> + 'a>,
}

impl<'a> SetsRepository<'a> {
    pub fn new(
        conn: &'a Connection,
        get_current_time: Box<dyn Fn() -> DateTime<Utc> + 'a>,
    ) -> Self {
        SetsRepository {
            conn,
            get_current_time,
        }
    }

    pub fn create(&self, owner_id: &str, title: &str, srs_enabled: bool) -> Result<i64> {
        let now_utc = to_db_timestamp((self.get_current_time)());
        self.conn.execute(
            "INSERT INTO study_sets (owner_id, title, srs_enabled, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, title, srs_enabled as i64, now_utc],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get(&self, set_id: i64) -> Result<Option<StudySet>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM study_sets WHERE id = ?1", SET_COLUMNS))?;

        let mut rows = stmt.query([set_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(StudySetRowFactory::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Sets of an owner with review scheduling switched on, oldest first
    pub fn list_srs_enabled(&self, owner_id: &str) -> Result<Vec<StudySet>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM study_sets
             WHERE owner_id = ?1 AND srs_enabled = 1
             ORDER BY id ASC",
            SET_COLUMNS
        ))?;

        let rows = stmt.query_map([owner_id], StudySetRowFactory::from_row)?;

        let mut sets = Vec::new();
        for set in rows {
            sets.push(set?);
        }
        Ok(sets)
    }

    pub fn set_srs_enabled(&self, set_id: i64, srs_enabled: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE study_sets SET srs_enabled = ?1 WHERE id = ?2",
            params![srs_enabled as i64, set_id],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM study_sets", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connection::init_connection;

    fn create_test_db() -> Connection {
        init_connection(":memory:").expect("Failed to create test database")
    }

    fn create_repo(conn: &Connection) -> SetsRepository<'_> {
        SetsRepository::new(conn, Box::new(Utc::now))
    }

    #[test]
    fn test_create_set() {
        let conn = create_test_db();
        let repo = create_repo(&conn);
        let set_id = repo.create("user-1", "Genki I lesson 3", true).unwrap();
        assert_eq!(set_id, 1);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_get_set() {
        let conn = create_test_db();
        let repo = create_repo(&conn);
        let set_id = repo.create("user-1", "Particles", false).unwrap();

        let set = repo.get(set_id).unwrap().unwrap();
        assert_eq!(set.id, set_id);
        assert_eq!(set.owner_id, "user-1");
        assert_eq!(set.title, "Particles");
        assert!(!set.srs_enabled);
    }

    #[test]
    fn test_get_nonexistent_set() {
        let conn = create_test_db();
        let repo = create_repo(&conn);
        assert!(repo.get(999).unwrap().is_none());
    }

    #[test]
    fn test_list_srs_enabled_filters_owner_and_flag() {
        let conn = create_test_db();
        let repo = create_repo(&conn);
        let first = repo.create("user-1", "Verbs", true).unwrap();
        let _disabled = repo.create("user-1", "Adjectives", false).unwrap();
        let _other_owner = repo.create("user-2", "Verbs", true).unwrap();
        let second = repo.create("user-1", "Counters", true).unwrap();

        let ids: Vec<i64> = repo
            .list_srs_enabled("user-1")
            .unwrap()
            .iter()
            .map(|set| set.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn test_set_srs_enabled() {
        let conn = create_test_db();
        let repo = create_repo(&conn);
        let set_id = repo.create("user-1", "Kanji", false).unwrap();

        repo.set_srs_enabled(set_id, true).unwrap();
        assert!(repo.get(set_id).unwrap().unwrap().srs_enabled);
        assert_eq!(repo.list_srs_enabled("user-1").unwrap().len(), 1);
    }
}
