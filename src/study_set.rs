use chrono::{DateTime, Utc};
use serde::Serialize;

/// An owner's ordered collection of items.
///
/// Only `srs_enabled` matters to scheduling; the rest is context handed back
/// to callers so they can route a review session into the set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySet {
    pub id: i64,
    pub owner_id: String,
    pub title: String,
    pub srs_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_study_set_serializes_camel_case() {
        let set = StudySet {
            id: 4,
            owner_id: "user-1".to_string(),
            title: "JLPT N5 verbs".to_string(),
            srs_enabled: true,
            created_at: DateTime::parse_from_rfc3339("2025-01-15T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["ownerId"], "user-1");
        assert_eq!(json["srsEnabled"], true);
        assert_eq!(json["title"], "JLPT N5 verbs");
    }
}
