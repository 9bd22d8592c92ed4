//! Flattens nested Signal K values into dotted scalar leaves.
//!
//! `navigation.position = {latitude, longitude}` becomes two leaves,
//! `navigation.position.latitude` and `navigation.position.longitude`.
//! Arrays flatten by index. Nulls produce nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Date-time layouts accepted without a UTC offset. Interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// One scalar produced by flattening.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    Number(f64),
    /// A string that did not parse as a timestamp.
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Number,
    String,
}

impl Leaf {
    pub fn kind(&self) -> LeafKind {
        match self {
            Leaf::Number(_) => LeafKind::Number,
            Leaf::Text(_) => LeafKind::String,
        }
    }

    /// Gauge value: the number itself, or `1` for text leaves.
    pub fn numeric_value(&self) -> f64 {
        match self {
            Leaf::Number(v) => *v,
            Leaf::Text(_) => 1.0,
        }
    }
}

/// Which scalar types survive flattening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlattenMode {
    /// Numbers, booleans (as 1/0), timestamps (as epoch ms) and strings.
    #[default]
    Lenient,
    /// JSON numbers only.
    Strict,
}

/// Flatten `value` into leaves keyed by their full dotted path.
///
/// Colliding paths (`{"a.b": 1, "a": {"b": 2}}`) resolve to whichever is
/// visited last in key order.
pub fn flatten(prefix: &str, value: &Value, mode: FlattenMode) -> BTreeMap<String, Leaf> {
    let mut leaves = BTreeMap::new();
    flatten_into(prefix, value, mode, &mut leaves);
    leaves
}

fn flatten_into(path: &str, value: &Value, mode: FlattenMode, out: &mut BTreeMap<String, Leaf>) {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                out.insert(path.to_string(), Leaf::Number(v));
            }
        }
        Value::Bool(b) if mode == FlattenMode::Lenient => {
            out.insert(path.to_string(), Leaf::Number(if *b { 1.0 } else { 0.0 }));
        }
        Value::String(s) if mode == FlattenMode::Lenient => {
            let leaf = match parse_timestamp_millis(s) {
                Some(ms) => Leaf::Number(ms as f64),
                None => Leaf::Text(s.clone()),
            };
            out.insert(path.to_string(), leaf);
        }
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(&join(path, key), child, mode, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(&join(path, &index.to_string()), child, mode, out);
            }
        }
        _ => {}
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Parse a date-like string into epoch milliseconds.
///
/// Accepts RFC 3339, RFC 2822, offset-less ISO date-times (as UTC) and bare
/// `YYYY-MM-DD` dates. Anything else, including bare numbers, is `None`.
pub fn parse_timestamp_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JAN_1_2024_MS: i64 = 1_704_067_200_000;

    fn single(path: &str, leaf: Leaf) -> BTreeMap<String, Leaf> {
        BTreeMap::from([(path.to_string(), leaf)])
    }

    #[test]
    fn scalars() {
        assert_eq!(flatten("a.b", &json!(42), FlattenMode::Lenient), single("a.b", Leaf::Number(42.0)));
        assert_eq!(flatten("a.b", &json!(true), FlattenMode::Lenient), single("a.b", Leaf::Number(1.0)));
        assert_eq!(flatten("a.b", &json!(false), FlattenMode::Lenient), single("a.b", Leaf::Number(0.0)));
        assert_eq!(
            flatten("a.b", &json!("hello"), FlattenMode::Lenient),
            single("a.b", Leaf::Text("hello".to_string()))
        );
    }

    #[test]
    fn nested_object() {
        let leaves = flatten(
            "navigation.position",
            &json!({"latitude": 60.1, "longitude": 24.9}),
            FlattenMode::Lenient,
        );
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves["navigation.position.latitude"], Leaf::Number(60.1));
        assert_eq!(leaves["navigation.position.longitude"], Leaf::Number(24.9));
    }

    #[test]
    fn deep_mixed_nesting() {
        let leaves = flatten(
            "electrical.batteries",
            &json!({"house": {"voltage": 12.6, "charging": true, "mode": "float", "extra": null}}),
            FlattenMode::Lenient,
        );
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves["electrical.batteries.house.voltage"], Leaf::Number(12.6));
        assert_eq!(leaves["electrical.batteries.house.charging"], Leaf::Number(1.0));
        assert_eq!(leaves["electrical.batteries.house.mode"].kind(), LeafKind::String);
    }

    #[test]
    fn arrays_flatten_by_index() {
        let leaves = flatten("sensors", &json!([1.5, {"t": 2}]), FlattenMode::Lenient);
        assert_eq!(leaves["sensors.0"], Leaf::Number(1.5));
        assert_eq!(leaves["sensors.1.t"], Leaf::Number(2.0));
    }

    #[test]
    fn empty_prefix_uses_bare_keys() {
        let leaves = flatten("", &json!({"name": "Aurora", "mmsi": "230099999"}), FlattenMode::Lenient);
        assert_eq!(leaves["name"], Leaf::Text("Aurora".to_string()));
        assert_eq!(leaves["mmsi"], Leaf::Text("230099999".to_string()));
    }

    #[test]
    fn null_yields_nothing() {
        assert!(flatten("a", &Value::Null, FlattenMode::Lenient).is_empty());
        assert!(flatten("a", &json!({}), FlattenMode::Lenient).is_empty());
    }

    #[test]
    fn date_strings_become_epoch_millis() {
        let leaves = flatten("navigation.datetime", &json!("2024-01-01T00:00:00Z"), FlattenMode::Lenient);
        assert_eq!(leaves["navigation.datetime"], Leaf::Number(JAN_1_2024_MS as f64));
    }

    #[test]
    fn strict_mode_keeps_only_numbers() {
        let leaves = flatten(
            "x",
            &json!({"n": 3, "b": true, "s": "text", "d": "2024-01-01T00:00:00Z"}),
            FlattenMode::Strict,
        );
        assert_eq!(leaves, single("x.n", Leaf::Number(3.0)));
    }

    #[test]
    fn colliding_paths_keep_last_in_key_order() {
        // "a" sorts before "a.b", so the literal dotted key is visited last.
        let leaves = flatten("p", &json!({"a.b": 1, "a": {"b": 2}}), FlattenMode::Lenient);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves["p.a.b"], Leaf::Number(1.0));
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp_millis("2024-01-01T00:00:00Z"), Some(JAN_1_2024_MS));
        assert_eq!(parse_timestamp_millis("2024-01-01T00:00:00.250Z"), Some(JAN_1_2024_MS + 250));
        assert_eq!(parse_timestamp_millis("2024-01-01T02:00:00+02:00"), Some(JAN_1_2024_MS));
        assert_eq!(parse_timestamp_millis("2024-01-01T00:00:00"), Some(JAN_1_2024_MS));
        assert_eq!(parse_timestamp_millis("2024-01-01"), Some(JAN_1_2024_MS));
        assert_eq!(parse_timestamp_millis("Mon, 01 Jan 2024 00:00:00 +0000"), Some(JAN_1_2024_MS));
    }

    #[test]
    fn non_dates_do_not_parse() {
        assert_eq!(parse_timestamp_millis("hello"), None);
        assert_eq!(parse_timestamp_millis("12"), None);
        assert_eq!(parse_timestamp_millis(""), None);
        assert_eq!(parse_timestamp_millis("2024-13-45"), None);
    }
}
