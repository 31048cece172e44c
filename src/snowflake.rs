//! Snowflake id clock.
//!
//! Message ids are 64-bit snowflakes: the top 42 bits hold milliseconds since
//! the Twitter epoch. Every ordering decision in the pipeline (payload
//! ordering, root ordering, statistics) goes through this module.

use chrono::{DateTime, Utc};

/// Twitter epoch in Unix milliseconds (2010-11-04T01:42:54.657Z).
pub const TWITTER_EPOCH_MS: i64 = 1_288_834_974_657;

/// Unix milliseconds encoded in a snowflake id.
pub fn timestamp_millis(id: u64) -> i64 {
    (id >> 22) as i64 + TWITTER_EPOCH_MS
}

/// Parse a numeric id string.
pub fn parse_id(id: &str) -> Option<u64> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// Decode the creation time of an id, or `None` if the id is not numeric.
pub fn decode(id: &str) -> Option<DateTime<Utc>> {
    let millis = timestamp_millis(parse_id(id)?);
    DateTime::from_timestamp_millis(millis)
}

/// Ordering key: `(millis, numeric id)`. Unparseable ids sort last.
pub fn sort_key(id: &str) -> (i64, u64) {
    match parse_id(id) {
        Some(n) => (timestamp_millis(n), n),
        None => (i64::MAX, u64::MAX),
    }
}

/// Whole seconds from `earlier` to `later`, each truncated to Unix seconds
/// first. Returns `None` for unparseable ids.
pub fn seconds_between(earlier: &str, later: &str) -> Option<i64> {
    let a = timestamp_millis(parse_id(earlier)?).div_euclid(1000);
    let b = timestamp_millis(parse_id(later)?).div_euclid(1000);
    Some(b - a)
}


#[cfg(test)]
mod tests {
    use super::testing::id_at;
    use super::*;

    #[test]
    fn decodes_known_id() {
        // 2016-07-13 era tweet id
        let dt = decode("753250443924164608").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2016-07-13");
    }

    #[test]
    fn rejects_non_numeric() {
        assert!(decode("abc").is_none());
        assert!(decode("").is_none());
        assert!(decode("-12").is_none());
        assert_eq!(sort_key("nope"), (i64::MAX, u64::MAX));
    }

    #[test]
    fn sort_key_orders_by_time() {
        let early = id_at(10);
        let late = id_at(70);
        assert!(sort_key(&early) < sort_key(&late));
        assert_eq!(seconds_between(&early, &late), Some(60));
    }
}
