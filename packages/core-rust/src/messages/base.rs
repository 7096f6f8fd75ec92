//! Base message trait shared across all module payloads.
//!
//! Messages are plain serde structs marked `#[serde(default)]` so that missing
//! fields fall back to `Default`. Unknown keys are ignored and aliases are
//! declared with `#[serde(alias = "...")]`.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ModuleMessage
// ---------------------------------------------------------------------------

/// Serialisable message exchanged between modules, with lenient construction.
pub trait ModuleMessage: Serialize + DeserializeOwned + Default {
    /// Post-construction clean-up (trimming, case folding). Default is a no-op.
    fn normalize(&mut self) {}

    /// Creates a message from arbitrary payload data.
    ///
    /// Strict deserialization is tried first. If it fails, the message is
    /// rebuilt from the subset of recognised fields whose values validate on
    /// their own; `null` or non-object payloads produce the default message.
    fn from_payload(payload: Value) -> Self {
        let mut message = match serde_json::from_value::<Self>(payload.clone()) {
            Ok(message) => message,
            Err(_) => lenient_from_object(payload),
        };
        message.normalize();
        message
    }

    /// Returns the JSON object form of the message with `null` fields omitted.
    fn to_payload(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.retain(|_, value| !value.is_null());
                map
            }
            _ => Map::new(),
        }
    }

    /// Returns a copy with `updates` merged over the current payload.
    #[must_use]
    fn clone_with(&self, updates: Map<String, Value>) -> Self {
        let mut data = self.to_payload();
        data.extend(updates);
        Self::from_payload(Value::Object(data))
    }
}

/// Marker trait for request payloads.
pub trait ModuleRequest: ModuleMessage {}

/// Marker trait for response payloads.
pub trait ModuleResponse: ModuleMessage {}

fn lenient_from_object<T: DeserializeOwned + Default>(payload: Value) -> T {
    let Value::Object(fields) = payload else {
        return T::default();
    };
    let mut accepted = Map::new();
    for (key, value) in fields {
        let mut candidate = accepted.clone();
        candidate.insert(key.clone(), value);
        if serde_json::from_value::<T>(Value::Object(candidate.clone())).is_ok() {
            accepted = candidate;
        } else {
            tracing::debug!(field = %key, "dropping payload field that failed validation");
        }
    }
    serde_json::from_value(Value::Object(accepted)).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Deserializes a JSON object, mapping any other value (including `null`) to an
/// empty map.
pub(crate) fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// Deserializes either a list of strings or a comma-separated string.
pub(crate) fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrText {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<ListOrText>::deserialize(deserializer)? {
        Some(ListOrText::List(items)) => items,
        Some(ListOrText::Text(text)) => text
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    })
}
