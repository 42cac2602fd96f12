use crate::error::SchedulerError;
use crate::spaced_repetition::SrsRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Item kinds; each kind has its own daily learn-new quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Vocabulary,
    Grammar,
}

impl ItemKind {
    pub fn as_str(&self) -> &str {
        match self {
            ItemKind::Vocabulary => "vocabulary",
            ItemKind::Grammar => "grammar",
        }
    }

    pub fn from(s: &str) -> Option<Self> {
        match s {
            "vocabulary" => Some(ItemKind::Vocabulary),
            "grammar" => Some(ItemKind::Grammar),
            _ => None,
        }
    }
}

impl FromStr for ItemKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemKind::from(&s.to_ascii_lowercase()).ok_or_else(|| SchedulerError::UnknownKind(s.to_string()))
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vocabulary or grammar fact.
///
/// Content fields (english, kana, kanji, ...) are opaque to scheduling and
/// are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnableItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub owner_id: String,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

/// An item joined with its review record for the requested scope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemWithSrs {
    #[serde(flatten)]
    pub item: LearnableItem,
    pub srs: Option<SrsRecord>,
}

impl ItemWithSrs {
    pub fn is_unseen(&self) -> bool {
        self.srs.as_ref().is_none_or(SrsRecord::is_unseen)
    }
}
