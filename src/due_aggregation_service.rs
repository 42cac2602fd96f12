use crate::error::{Result, SchedulerError};
use crate::item::{ItemKind, ItemWithSrs};
use crate::spaced_repetition::{ReviewScheduler, SrsRecord};
use crate::study_set::StudySet;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;

/// Where the aggregation reads sets and their items from.
///
/// Implementations may be local (SQLite) or remote; every call is wrapped
/// in a timeout by the service.
#[allow(async_fn_in_trait)]
pub trait SetItemSource {
    /// SRS-enabled sets of an owner, in a stable order
    async fn srs_enabled_sets(&self, owner_id: &str) -> Result<Vec<StudySet>>;

    async fn find_set(&self, set_id: i64) -> Result<Option<StudySet>>;

    /// Items of a set in set order, each joined with its record for `scope`
    async fn set_items(&self, set_id: i64, scope: &str) -> Result<Vec<ItemWithSrs>>;

    /// Items of a set that have not entered the review cycle
    async fn unseen_items(
        &self,
        set_id: i64,
        scope: &str,
        kind: Option<ItemKind>,
        limit: usize,
    ) -> Result<Vec<ItemWithSrs>> {
        let items = self.set_items(set_id, scope).await?;
        Ok(items
            .into_iter()
            .filter(|item| item.is_unseen())
            .filter(|item| kind.is_none_or(|kind| item.item.kind == kind))
            .take(limit)
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Upper bound on per-set fetches running at once
    pub max_concurrency: usize,
    /// Budget for each individual fetch
    pub fetch_timeout: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// A due item together with the set it was found in
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub set_id: i64,
    pub set_title: String,
    pub srs_level: i64,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl DueItem {
    fn new(set: &StudySet, item: ItemWithSrs) -> Self {
        DueItem {
            id: item.item.id,
            kind: item.item.kind,
            set_id: set.id,
            set_title: set.title.clone(),
            srs_level: SrsRecord::level_of(item.srs.as_ref()),
            content: item.item.content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDueCount {
    pub set_id: i64,
    pub set_title: String,
    pub due_count: usize,
}

/// A set left out of an aggregation because its fetch failed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFailure {
    pub set_id: i64,
    pub set_title: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueForOwner {
    /// `None` in count-only mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<DueItem>>,
    pub total_due: usize,
    pub by_set: Vec<SetDueCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_sets: Vec<SetFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueForSet {
    pub set: StudySet,
    pub items: Vec<ItemWithSrs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnNewCandidates {
    pub items: Vec<ItemWithSrs>,
}

/// Collects due items across an owner's library
pub struct DueAggregationService<'a, S: SetItemSource + ?Sized> {
    source: &'a S,
    scheduler: ReviewScheduler,
    config: AggregationConfig,
}

impl<'a, S: SetItemSource + ?Sized> DueAggregationService<'a, S> {
    pub fn new(source: &'a S, scheduler: ReviewScheduler, config: AggregationConfig) -> Self {
        Self {
            source,
            scheduler,
            config,
        }
    }

    /// Due items of every SRS-enabled set of the owner, with per-set counts.
    ///
    /// Sets that fail or time out contribute nothing and are listed in
    /// `failed_sets`; only listing the owner's sets can fail the call.
    pub async fn due_for_owner(&self, owner_id: &str, scope: &str, now: DateTime<Utc>) -> Result<DueForOwner> {
        self.aggregate(owner_id, scope, now, true).await
    }

    /// Same as `due_for_owner` without the item payload
    pub async fn due_count_for_owner(
        &self,
        owner_id: &str,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<DueForOwner> {
        self.aggregate(owner_id, scope, now, false).await
    }

    /// Due items of one set. Unlike the owner-wide query a failing fetch is
    /// returned to the caller.
    pub async fn due_for_set(&self, set_id: i64, scope: &str, now: DateTime<Utc>) -> Result<DueForSet> {
        let set = self.load_set(set_id).await?;
        let items = self.fetch_set_items(set_id, scope).await?;
        let items = self.filter_due(&set, items, now);
        debug!("Set {} has {} due items", set_id, items.len());
        Ok(DueForSet { set, items })
    }

    /// Unseen items of a set, in set order, at most `limit` of them
    pub async fn learn_new_candidates(
        &self,
        set_id: i64,
        scope: &str,
        kind: Option<ItemKind>,
        limit: usize,
    ) -> Result<LearnNewCandidates> {
        self.load_set(set_id).await?;
        let items = self
            .bounded(
                self.source.unseen_items(set_id, scope, kind, limit),
                |timeout| SchedulerError::FetchTimeout { set_id, timeout },
            )
            .await?;
        Ok(LearnNewCandidates { items })
    }

    async fn aggregate(
        &self,
        owner_id: &str,
        scope: &str,
        now: DateTime<Utc>,
        include_items: bool,
    ) -> Result<DueForOwner> {
        let sets = self
            .bounded(self.source.srs_enabled_sets(owner_id), |timeout| {
                SchedulerError::OwnerTimeout {
                    owner_id: owner_id.to_string(),
                    timeout,
                }
            })
            .await?;

        let fetched: Vec<(StudySet, Result<Vec<ItemWithSrs>>)> = futures::stream::iter(sets)
            .map(|set| async move {
                let items = self.fetch_set_items(set.id, scope).await;
                (set, items)
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut result = DueForOwner {
            items: include_items.then(Vec::new),
            total_due: 0,
            by_set: Vec::new(),
            failed_sets: Vec::new(),
        };

        for (set, items) in fetched {
            let items = match items {
                Ok(items) => items,
                Err(e) => {
                    warn!("Skipping set {} ('{}') in due aggregation: {}", set.id, set.title, e);
                    result.failed_sets.push(SetFailure {
                        set_id: set.id,
                        set_title: set.title.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let due = self.filter_due(&set, items, now);
            if due.is_empty() {
                continue;
            }

            result.total_due += due.len();
            result.by_set.push(SetDueCount {
                set_id: set.id,
                set_title: set.title.clone(),
                due_count: due.len(),
            });
            if let Some(collected) = result.items.as_mut() {
                collected.extend(due.into_iter().map(|item| DueItem::new(&set, item)));
            }
        }

        info!(
            "Owner {} has {} due items in {} sets ({} sets failed)",
            owner_id,
            result.total_due,
            result.by_set.len(),
            result.failed_sets.len()
        );
        Ok(result)
    }

    fn filter_due(&self, set: &StudySet, items: Vec<ItemWithSrs>, now: DateTime<Utc>) -> Vec<ItemWithSrs> {
        items
            .into_iter()
            .filter(|item| {
                if let Some(record) = item.srs.as_ref().filter(|record| !record.is_well_formed()) {
                    debug!(
                        "Skipping malformed SRS record for item {} in set {}: level={:?}, time_created={:?}",
                        record.item_id, set.id, record.level, record.time_created
                    );
                }
                self.scheduler.is_due(item.srs.as_ref(), now)
            })
            .collect()
    }

    async fn load_set(&self, set_id: i64) -> Result<StudySet> {
        self.bounded(self.source.find_set(set_id), |timeout| {
            SchedulerError::FetchTimeout { set_id, timeout }
        })
        .await?
        .ok_or(SchedulerError::SetNotFound(set_id))
    }

    async fn fetch_set_items(&self, set_id: i64, scope: &str) -> Result<Vec<ItemWithSrs>> {
        self.bounded(self.source.set_items(set_id, scope), |timeout| {
            SchedulerError::FetchTimeout { set_id, timeout }
        })
        .await
    }

    async fn bounded<T>(
        &self,
        fetch: impl Future<Output = Result<T>>,
        on_timeout: impl FnOnce(Duration) -> SchedulerError,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(self.config.fetch_timeout)),
        }
    }
}
