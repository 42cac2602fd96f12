pub mod connection;
pub mod items;
pub mod sets;
pub mod srs_records;
pub mod transition_events;

use crate::admission::FirstEntryCounter;
use crate::date_provider::{DateProvider, SystemDateProvider};
use crate::due_aggregation_service::SetItemSource;
use crate::item::{ItemKind, ItemWithSrs, LearnableItem};
use crate::review_session::SrsStore;
use crate::spaced_repetition::{SrsRecord, Transition};
use crate::study_set::StudySet;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{Connection, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

pub use items::ItemsRepository;
pub use sets::SetsRepository;
pub use srs_records::SrsRecordsRepository;
pub use transition_events::TransitionEventsRepository;

/// Main Database struct providing access to all repositories
pub struct Database {
    pub conn: Connection,
    date_provider: Arc<dyn DateProvider>,
}

impl Database {
    pub fn new(db_path: &str) -> crate::error::Result<Self> {
        Self::init(db_path, Arc::new(SystemDateProvider))
    }

    pub fn with_date_provider(db_path: &str, date_provider: Arc<dyn DateProvider>) -> crate::error::Result<Self> {
        Self::init(db_path, date_provider)
    }

    fn init(db_path: &str, date_provider: Arc<dyn DateProvider>) -> crate::error::Result<Self> {
        let conn = connection::init_connection(db_path)?;
        Ok(Database {
            conn,
            date_provider,
        })
    }

    /// Current time according to the configured date provider
    pub fn current_time(&self) -> DateTime<Utc> {
        self.date_provider.get_current_time()
    }

    // ===== Sets Repository Access =====

    pub fn create_set(&self, owner_id: &str, title: &str, srs_enabled: bool) -> Result<i64> {
        let repo = SetsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.create(owner_id, title, srs_enabled)
    }

    pub fn get_set(&self, set_id: i64) -> Result<Option<StudySet>> {
        let repo = SetsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.get(set_id)
    }

    pub fn list_srs_enabled_sets(&self, owner_id: &str) -> Result<Vec<StudySet>> {
        let repo = SetsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.list_srs_enabled(owner_id)
    }

    pub fn set_srs_enabled(&self, set_id: i64, srs_enabled: bool) -> Result<()> {
        let repo = SetsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.set_srs_enabled(set_id, srs_enabled)
    }

    pub fn count_sets(&self) -> Result<i64> {
        let repo = SetsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.count()
    }

    // ===== Items Repository Access =====

    pub fn insert_item(&self, owner_id: &str, kind: ItemKind, content: &Map<String, Value>) -> Result<i64> {
        let repo = ItemsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.insert(owner_id, kind, content)
    }

    pub fn get_item(&self, item_id: i64) -> Result<Option<LearnableItem>> {
        let repo = ItemsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.get(item_id)
    }

    pub fn add_item_to_set(&self, set_id: i64, item_id: i64) -> Result<()> {
        let repo = ItemsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.add_to_set(set_id, item_id)
    }

    pub fn remove_item_from_set(&self, set_id: i64, item_id: i64) -> Result<()> {
        let repo = ItemsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.remove_from_set(set_id, item_id)
    }

    pub fn list_set_items(&self, set_id: i64, scope: &str) -> Result<Vec<ItemWithSrs>> {
        let repo = ItemsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.list_with_srs(set_id, scope)
    }

    pub fn list_unseen_items(
        &self,
        set_id: i64,
        scope: &str,
        kind: Option<ItemKind>,
        limit: usize,
    ) -> Result<Vec<ItemWithSrs>> {
        let repo = ItemsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.list_unseen(set_id, scope, kind, limit)
    }

    pub fn count_items(&self) -> Result<i64> {
        let repo = ItemsRepository::new(&self.conn, Box::new(|| self.current_time()));
        repo.count()
    }

    // ===== SRS Records Repository Access =====

    pub fn get_srs_record(&self, item_id: i64, scope: &str) -> Result<Option<SrsRecord>> {
        let repo = SrsRecordsRepository::new(&self.conn);
        repo.get(item_id, scope)
    }

    pub fn upsert_srs_record(&self, record: &SrsRecord) -> Result<()> {
        let repo = SrsRecordsRepository::new(&self.conn);
        repo.upsert(record)
    }

    pub fn count_srs_records(&self) -> Result<i64> {
        let repo = SrsRecordsRepository::new(&self.conn);
        repo.count()
    }

    // ===== Transition Events Repository Access =====

    /// Persists the record a transition produces together with its event
    pub fn record_transition(&self, transition: &Transition) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        SrsRecordsRepository::new(&tx).upsert(&transition.to_record())?;
        let event_id = TransitionEventsRepository::new(&tx).insert(transition)?;
        tx.commit()?;
        debug!(
            "Recorded transition event {} for item {} ({} -> {})",
            event_id, transition.item_id, transition.previous_level, transition.new_level
        );
        Ok(event_id)
    }

    /// Rewrites a recorded transition and the record it produced
    pub fn amend_transition(&self, event_id: i64, transition: &Transition) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        SrsRecordsRepository::new(&tx).upsert(&transition.to_record())?;
        TransitionEventsRepository::new(&tx).amend(event_id, transition)?;
        tx.commit()
    }

    pub fn list_transitions(&self, item_id: i64, scope: &str) -> Result<Vec<Transition>> {
        let repo = TransitionEventsRepository::new(&self.conn);
        repo.list_for_item(item_id, scope)
    }

    pub fn count_transitions(&self) -> Result<i64> {
        let repo = TransitionEventsRepository::new(&self.conn);
        repo.count()
    }
}

impl FirstEntryCounter for Database {
    fn count_first_entries(
        &self,
        set_id: i64,
        kind: ItemKind,
        scope: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> crate::error::Result<i64> {
        let repo = TransitionEventsRepository::new(&self.conn);
        Ok(repo.count_first_entries(set_id, kind, scope, start, end)?)
    }
}

/// Local SQLite source.
///
/// Each call runs its query synchronously on the calling task and is ready
/// on first poll, so the aggregation's fetch timeout never fires for it and
/// `max_concurrency` does not overlap its fetches. Those bounds apply to
/// sources that actually await remote I/O.
impl SetItemSource for Database {
    async fn srs_enabled_sets(&self, owner_id: &str) -> crate::error::Result<Vec<StudySet>> {
        Ok(self.list_srs_enabled_sets(owner_id)?)
    }

    async fn find_set(&self, set_id: i64) -> crate::error::Result<Option<StudySet>> {
        Ok(self.get_set(set_id)?)
    }

    async fn set_items(&self, set_id: i64, scope: &str) -> crate::error::Result<Vec<ItemWithSrs>> {
        Ok(self.list_set_items(set_id, scope)?)
    }

    async fn unseen_items(
        &self,
        set_id: i64,
        scope: &str,
        kind: Option<ItemKind>,
        limit: usize,
    ) -> crate::error::Result<Vec<ItemWithSrs>> {
        Ok(self.list_unseen_items(set_id, scope, kind, limit)?)
    }
}

impl SrsStore for Database {
    fn load_record(&self, item_id: i64, scope: &str) -> crate::error::Result<Option<SrsRecord>> {
        Ok(self.get_srs_record(item_id, scope)?)
    }

    fn record_transition(&self, transition: &Transition) -> crate::error::Result<i64> {
        Ok(Database::record_transition(self, transition)?)
    }

    fn amend_transition(&self, event_id: i64, transition: &Transition) -> crate::error::Result<()> {
        Ok(Database::amend_transition(self, event_id, transition)?)
    }

    fn item_exists(&self, item_id: i64) -> crate::error::Result<bool> {
        Ok(self.get_item(item_id)?.is_some())
    }
}
