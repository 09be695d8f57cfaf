use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use mongodb::bson::DateTime as BsonDateTime;

use crate::models::StreakUpdate;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

pub fn bson_to_chrono(dt: BsonDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

/// Parses an IANA zone name, falling back to UTC when absent or unknown.
pub fn resolve_timezone(name: Option<&str>) -> Tz {
    name.and_then(|name| name.trim().parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

pub fn is_known_timezone(name: &str) -> bool {
    name.parse::<Tz>().is_ok()
}

/// Calendar date of `now` as seen in `tz`.
pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Next streak value given the previous one and the last day it was bumped.
///
/// Same day keeps the counter, the following day increments it, anything
/// else (a gap, or no history) starts over at 1.
pub fn streak_transition(current: u32, last: Option<NaiveDate>, today: NaiveDate) -> StreakUpdate {
    match last {
        Some(last) if last == today => StreakUpdate {
            streak: current,
            changed: false,
        },
        Some(last) if today.checked_sub_days(Days::new(1)) == Some(last) => StreakUpdate {
            streak: current.saturating_add(1),
            changed: true,
        },
        _ => StreakUpdate {
            streak: 1,
            changed: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bson_round_trip_keeps_millisecond_precision() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(bson_to_chrono(chrono_to_bson(now)), now);
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        assert_eq!(resolve_timezone(None), Tz::UTC);
        assert_eq!(resolve_timezone(Some("Mars/Olympus")), Tz::UTC);
        assert_eq!(
            resolve_timezone(Some("Asia/Tokyo")),
            chrono_tz::Asia::Tokyo
        );
        assert!(!is_known_timezone("Not/AZone"));
    }

    #[test]
    fn local_date_depends_on_zone() {
        // 23:30 UTC is already the next day in Tokyo.
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(today_in(Tz::UTC, now), date(2024, 3, 1));
        assert_eq!(today_in(chrono_tz::Asia::Tokyo, now), date(2024, 3, 2));
        assert_eq!(
            today_in(chrono_tz::America::Los_Angeles, now),
            date(2024, 3, 1)
        );
    }

    #[test]
    fn streak_rules() {
        let today = date(2024, 3, 10);

        let same_day = streak_transition(4, Some(today), today);
        assert_eq!(same_day, StreakUpdate { streak: 4, changed: false });

        let next_day = streak_transition(4, Some(date(2024, 3, 9)), today);
        assert_eq!(next_day, StreakUpdate { streak: 5, changed: true });

        let gap = streak_transition(4, Some(date(2024, 3, 7)), today);
        assert_eq!(gap, StreakUpdate { streak: 1, changed: true });

        let first = streak_transition(0, None, today);
        assert_eq!(first, StreakUpdate { streak: 1, changed: true });
    }

    #[test]
    fn streak_crosses_month_boundary() {
        let update = streak_transition(2, Some(date(2024, 2, 29)), date(2024, 3, 1));
        assert_eq!(update.streak, 3);
    }
}
