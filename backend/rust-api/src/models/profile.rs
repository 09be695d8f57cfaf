use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-owned meta keys that a profile patch may not touch.
pub const RESERVED_META_KEYS: &[&str] = &["streak_last_date"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileMeta {
    /// IANA time zone name used for streak day boundaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak_last_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: i64,
    pub streak: u32,
    #[serde(default)]
    pub stats: Map<String, Value>,
    #[serde(default)]
    pub meta: ProfileMeta,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            streak: 0,
            stats: Map::new(),
            meta: ProfileMeta::default(),
            updated_at: now,
        }
    }
}

/// Closed set of fields a client may change on its profile.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub streak: Option<u32>,
    pub stats: Option<Map<String, Value>>,
    pub meta: Option<Map<String, Value>>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.streak.is_none() && self.stats.is_none() && self.meta.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub streak: u32,
    pub changed: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    pub total_attempts: usize,
    pub completed_levels: usize,
    pub total_diamonds: i64,
    pub current_streak: u32,
    pub average_score: f64,
    pub achievements_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_update_rejects_unknown_fields() {
        let err = serde_json::from_str::<ProfileUpdate>(r#"{"streak": 2, "diamonds": 500}"#);
        assert!(err.is_err());

        let ok: ProfileUpdate = serde_json::from_str(r#"{"meta": {"timezone": "Europe/Berlin"}}"#)
            .unwrap();
        assert!(ok.meta.is_some());
        assert!(!ok.is_empty());
    }

    #[test]
    fn meta_keeps_unknown_keys_alongside_typed_ones() {
        let meta: ProfileMeta = serde_json::from_str(
            r#"{"timezone":"Asia/Tokyo","streak_last_date":"2024-03-01","theme":"dark"}"#,
        )
        .unwrap();

        assert_eq!(meta.timezone.as_deref(), Some("Asia/Tokyo"));
        assert_eq!(
            meta.streak_last_date,
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(meta.extra.get("theme"), Some(&Value::from("dark")));
    }
}
