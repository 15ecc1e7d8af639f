//! Database entities

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Companion {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub topic: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    /// Minutes.
    pub duration: i64,
    pub author: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Caller-supplied companion fields; the author is never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompanion {
    pub name: String,
    pub subject: String,
    pub topic: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    pub duration: i64,
}

/// Row written on companion creation.
#[derive(Debug, Serialize)]
pub struct CompanionRow {
    pub id: Uuid,
    pub author: String,
    #[serde(serialize_with = "fixed_width")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: NewCompanion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    pub id: Uuid,
    pub user_id: String,
    pub companion_id: Uuid,
    #[serde(serialize_with = "fixed_width")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: Uuid,
    pub user_id: String,
    pub companion_id: Uuid,
    #[serde(serialize_with = "fixed_width")]
    pub created_at: DateTime<Utc>,
}

/// Session and bookmark rows selected with their companion embedded.
#[derive(Debug, Deserialize)]
pub struct EmbeddedCompanion {
    pub companions: Option<Companion>,
}

/// Timestamps are compared as text by the local store, so they are written
/// with a fixed number of fractional digits.
fn fixed_width<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn companion_row_flattens_fields() {
        let row = CompanionRow {
            id: Uuid::nil(),
            author: "user_1".into(),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            fields: NewCompanion {
                name: "Neura".into(),
                subject: "science".into(),
                topic: "Neurons".into(),
                voice: Some("female".into()),
                style: None,
                duration: 15,
            },
        };

        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["author"], "user_1");
        assert_eq!(value["name"], "Neura");
        assert_eq!(value["duration"], 15);
        assert_eq!(value["created_at"], "2025-03-01T12:00:00.000000Z");
    }

    #[test]
    fn companion_accepts_store_timestamps_and_missing_optionals() {
        let companion: Companion = serde_json::from_value(json!({
            "id": "6f1c1f0e-7c55-4a2f-9d59-0c5f7b1d7a10",
            "name": "Countsy",
            "subject": "maths",
            "topic": "Derivatives",
            "duration": 30,
            "author": "user_2",
            "created_at": "2025-03-01T12:00:00.123456+00:00"
        }))
        .unwrap();

        assert_eq!(companion.voice, None);
        assert_eq!(companion.duration, 30);
        assert!(companion.created_at.is_some());
    }
}
