//! Timestamps as delivered by the server

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A server timestamp: epoch milliseconds or an opaque (usually ISO 8601) string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

impl Timestamp {
    /// The instant this timestamp names, if it can be read as one.
    fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            Timestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive))
                }),
        }
    }

    /// Local wall-clock `HH:MM`, or an empty string if the value can't be read as a time.
    pub fn clock(&self) -> String {
        self.instant()
            .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default()
    }

    /// Sort key: readable instants above opaque text, then by instant, then
    /// millis before text, then by the raw text.
    fn sort_key(&self) -> (bool, i64, u8, &str) {
        match self {
            Timestamp::Millis(ms) => (true, *ms, 0, ""),
            Timestamp::Text(text) => match self.instant() {
                Some(t) => (true, t.timestamp_millis(), 1, text),
                None => (false, 0, 1, text),
            },
        }
    }
}

/// Total order for "latest wins" reductions. Timestamps that name an instant
/// compare chronologically whatever their form; unreadable text sorts below
/// them, lexicographically among itself.
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Millis(ms) => write!(f, "{}", ms),
            Timestamp::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Timestamp::Millis(ms)
    }
}

impl From<&str> for Timestamp {
    fn from(text: &str) -> Self {
        Timestamp::Text(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_number_and_string() {
        let n: Timestamp = serde_json::from_str("1000").unwrap();
        assert_eq!(n, Timestamp::Millis(1000));
        let s: Timestamp = serde_json::from_str("\"2024-01-15T10:30:00Z\"").unwrap();
        assert_eq!(s, Timestamp::from("2024-01-15T10:30:00Z"));
    }

    #[test]
    fn test_ordering() {
        assert!(Timestamp::from("t2") > Timestamp::from("t1"));
        assert!(Timestamp::Millis(20) > Timestamp::Millis(3));
        assert_ne!(
            Timestamp::Millis(5).cmp(&Timestamp::from("5")),
            Ordering::Equal
        );
    }

    #[test]
    fn test_ordering_is_transitive_across_forms() {
        let values = [
            Timestamp::Millis(9),
            Timestamp::Millis(10),
            Timestamp::from("10"),
            Timestamp::from("9"),
            Timestamp::from("1970-01-01T00:00:00.010Z"),
            Timestamp::from("2024-01-15T10:30:00Z"),
            Timestamp::Millis(1_705_314_600_000),
        ];
        for a in &values {
            for b in &values {
                assert_eq!(a.cmp(b), b.cmp(a).reverse());
                assert_eq!(a.cmp(b) == Ordering::Equal, a == b);
                for c in &values {
                    if a < b && b < c {
                        assert!(a < c, "{:?} < {:?} < {:?}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_max_does_not_depend_on_order() {
        let forward = [
            Timestamp::Millis(9),
            Timestamp::Millis(10),
            Timestamp::from("10"),
        ];
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(forward.iter().max(), Some(&Timestamp::Millis(10)));
        assert_eq!(backward.iter().max(), Some(&Timestamp::Millis(10)));
    }

    #[test]
    fn test_text_and_millis_compare_chronologically() {
        // 2024-01-15T10:30:00Z
        let iso = Timestamp::from("2024-01-15T10:30:00Z");
        assert!(iso > Timestamp::Millis(1_705_314_599_999));
        assert!(iso < Timestamp::Millis(1_705_314_600_001));
        assert!(Timestamp::from("t1") < Timestamp::Millis(0));
    }

    #[test]
    fn test_clock_format() {
        let clock = Timestamp::from("2024-01-15T10:30:00Z").clock();
        assert_eq!(clock.len(), 5);
        assert_eq!(&clock[2..3], ":");

        let naive = Timestamp::from("2024-01-15T10:30:00.123456").clock();
        assert_eq!(naive.len(), 5);

        assert_eq!(Timestamp::Millis(0).clock().len(), 5);
    }

    #[test]
    fn test_clock_unparsable_is_empty() {
        assert_eq!(Timestamp::from("t1").clock(), "");
        assert_eq!(Timestamp::from("").clock(), "");
    }
}
