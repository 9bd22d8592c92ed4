//! Signal K delta model and the stored sample types.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::flatten::{Leaf, parse_timestamp_millis};

/// Context a Signal K server uses to mean "the local vessel".
pub const SELF_CONTEXT_SENTINEL: &str = "vessels.self";

/// Build the self-context identifier for a vessel id.
///
/// Accepts either a bare id (`urn:mrn:imo:mmsi:230099999`) or an id that
/// already carries the `vessels.` prefix.
pub fn self_context_for(self_id: &str) -> String {
    if self_id.starts_with("vessels.") {
        self_id.to_string()
    } else {
        format!("vessels.{self_id}")
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Decode a JSON array entry by entry, dropping entries that do not fit `T`.
/// A non-array decodes as `None`.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let entries = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "malformed delta entry skipped");
                None
            }
        })
        .collect();
    Ok(Some(entries))
}

/// Accept any JSON scalar as a string; objects, arrays and null are `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// One ingestion event.
///
/// Both fields are optional on the wire; a delta without updates is a no-op.
/// Decoding is per entry: an update or value of the wrong shape is dropped
/// on its own and its siblings survive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Option::is_none")]
    pub updates: Option<Vec<Update>>,
}

/// A timestamped, sourced batch of values inside a delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// ISO-8601 string, or epoch milliseconds as a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    /// Flattened source reference, e.g. `gps.0` or `can0.115`.
    #[serde(
        rename = "$source",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_ref: Option<String>,
    /// Structured source object (`{"label": ..., "src": ...}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<PathValue>>,
}

impl Update {
    /// Timestamp in epoch milliseconds, if it is a date string or a number.
    pub fn timestamp_millis(&self) -> Option<i64> {
        match self.timestamp.as_ref()? {
            Value::String(s) => parse_timestamp_millis(s),
            Value::Number(n) => n.as_f64().filter(|ms| ms.is_finite()).map(|ms| ms as i64),
            _ => None,
        }
    }

    /// Resolve the source label for this update.
    ///
    /// Prefers `$source`; falls back to `label[.src]` from the structured
    /// source object; otherwise empty.
    pub fn source_label(&self) -> String {
        if let Some(source) = &self.source_ref {
            return source.clone();
        }
        let Some(obj) = self.source.as_ref().and_then(Value::as_object) else {
            return String::new();
        };
        let label = obj.get("label").and_then(Value::as_str);
        let src = match obj.get("src") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        match (label, src) {
            (Some(label), Some(src)) => format!("{label}.{src}"),
            (Some(label), None) => label.to_string(),
            _ => String::new(),
        }
    }
}

/// A path and its (possibly nested) value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

/// Identity of a stored sample.
///
/// String samples also carry their text so that every distinct string
/// value becomes its own row. Ordering is by path first, which keeps
/// samples of one metric adjacent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleKey {
    pub path: String,
    pub context: String,
    pub source: String,
    pub value_str: Option<String>,
}

/// Latest value of one leaf for one context and source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub path: String,
    pub value: f64,
    pub context: String,
    pub source: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_str: Option<String>,
}

impl Sample {
    /// Build a sample from a flattened leaf. Text leaves store `1`.
    pub fn from_leaf(path: String, leaf: Leaf, context: &str, source: &str, timestamp: i64) -> Self {
        let value = leaf.numeric_value();
        let value_str = match leaf {
            Leaf::Number(_) => None,
            Leaf::Text(text) => Some(text),
        };
        Self {
            path,
            value,
            context: context.to_string(),
            source: source.to_string(),
            timestamp,
            value_str,
        }
    }

    pub fn key(&self) -> SampleKey {
        SampleKey {
            path: self.path.clone(),
            context: self.context.clone(),
            source: self.source.clone(),
            value_str: self.value_str.clone(),
        }
    }
}
