//! Declared handler parameters and value coercion.
//!
//! A [`ParameterSpec`] is populated once when an endpoint is declared and
//! replaces runtime signature inspection: it names the parameter, its declared
//! type, where an HTTP request carries it, and whether it has a default.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

// ---------------------------------------------------------------------------
// ParamType
// ---------------------------------------------------------------------------

/// Declared type of a handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// No declared type; values pass through untouched.
    Any,
    String,
    Integer,
    Number,
    Boolean,
    /// List-like (`Vec<T>`); textual input is parsed as a JSON array.
    List,
    /// Mapping-like (`HashMap<K, V>`); textual input is parsed as a JSON object.
    Map,
}

impl ParamType {
    /// Returns `true` for structured types that accept JSON-encoded text.
    #[must_use]
    pub fn is_structured(self) -> bool {
        matches!(self, Self::List | Self::Map)
    }
}

// ---------------------------------------------------------------------------
// ParamSource
// ---------------------------------------------------------------------------

/// Where an HTTP request carries the parameter. Ignored on the console path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    Query,
    Path,
    Header,
    Body,
}

// ---------------------------------------------------------------------------
// ParamDefault / ParameterSpec
// ---------------------------------------------------------------------------

/// Default-value policy of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ParamDefault {
    /// The caller must supply a value.
    Required,
    /// Used when the caller supplies nothing. `Value(Value::Null)` models an
    /// optional parameter.
    Value(Value),
}

/// One declared parameter of an endpoint handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub ty: ParamType,
    pub source: ParamSource,
    pub default: ParamDefault,
}

impl ParameterSpec {
    /// Creates a required query parameter of the given type.
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            source: ParamSource::Query,
            default: ParamDefault::Required,
        }
    }

    /// Creates a query parameter with a default value.
    pub fn with_default(name: impl Into<String>, ty: ParamType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            source: ParamSource::Query,
            default: ParamDefault::Value(default.into()),
        }
    }

    /// Creates an optional query parameter that defaults to `null`.
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self::with_default(name, ty, Value::Null)
    }

    /// Changes where HTTP requests carry this parameter.
    #[must_use]
    pub fn from_source(mut self, source: ParamSource) -> Self {
        self.source = source;
        self
    }

    /// Shorthand for `from_source(ParamSource::Body)`.
    #[must_use]
    pub fn in_body(self) -> Self {
        self.from_source(ParamSource::Body)
    }

    /// Shorthand for `from_source(ParamSource::Path)`.
    #[must_use]
    pub fn in_path(self) -> Self {
        self.from_source(ParamSource::Path)
    }

    /// Shorthand for `from_source(ParamSource::Header)`.
    #[must_use]
    pub fn in_header(self) -> Self {
        self.from_source(ParamSource::Header)
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        matches!(self.default, ParamDefault::Required)
    }

    /// Returns the default value, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        match &self.default {
            ParamDefault::Required => None,
            ParamDefault::Value(value) => Some(value),
        }
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Coerces a resolved argument against its declared type.
///
/// Only textual values are touched:
/// - list-typed: JSON arrays are used as-is, other JSON values are wrapped in a
///   single-element list, and unparseable text becomes `[text]`;
/// - map-typed: JSON objects are used as-is, anything else passes through
///   unchanged as the original text.
#[must_use]
pub fn coerce_value(value: Value, ty: ParamType) -> Value {
    let Value::String(text) = value else {
        return value;
    };
    match ty {
        ParamType::List => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => Value::Array(items),
            Ok(other) => Value::Array(vec![other]),
            Err(_) => Value::Array(vec![Value::String(text)]),
        },
        ParamType::Map => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => Value::String(text),
        },
        _ => Value::String(text),
    }
}

/// Checks that a coerced value has the shape its structured type requires.
///
/// Lists must be arrays and maps must be objects; `null` is accepted for
/// both, and text a map could not parse is passed through. Other types are
/// not checked.
///
/// # Errors
///
/// Returns a human-readable reason naming the expected and actual shape.
pub fn check_shape(value: &Value, ty: ParamType) -> Result<(), String> {
    let ok = match ty {
        ParamType::List => matches!(value, Value::Array(_) | Value::Null),
        ParamType::Map => matches!(value, Value::Object(_) | Value::String(_) | Value::Null),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        let expected = if ty == ParamType::List { "a list" } else { "a map" };
        Err(format!("expected {expected}, got {}", json_kind(value)))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

/// Parses raw HTTP text (query string, path capture, header) into a JSON value
/// of the declared scalar type.
///
/// Structured types are returned as text so that [`coerce_value`] applies the
/// same JSON rules as the console path.
///
/// # Errors
///
/// Returns a human-readable reason when the text is not a valid value of the
/// declared scalar type.
pub fn parse_text(text: &str, ty: ParamType) -> Result<Value, String> {
    match ty {
        ParamType::Any | ParamType::String | ParamType::List | ParamType::Map => {
            Ok(Value::String(text.to_string()))
        }
        ParamType::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("expected an integer, got '{text}'")),
        ParamType::Number => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("expected a number, got '{text}'")),
        ParamType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(format!("expected a boolean, got '{text}'")),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn list_text_parses_json_array() {
        assert_eq!(coerce_value(json!("[1, 2]"), ParamType::List), json!([1, 2]));
    }

    #[test]
    fn list_malformed_text_is_wrapped() {
        assert_eq!(
            coerce_value(json!("not-json"), ParamType::List),
            json!(["not-json"])
        );
    }

    #[test]
    fn list_scalar_json_is_wrapped() {
        assert_eq!(coerce_value(json!("5"), ParamType::List), json!([5]));
    }

    #[test]
    fn map_text_parses_json_object() {
        assert_eq!(
            coerce_value(json!("{\"k\": 1}"), ParamType::Map),
            json!({"k": 1})
        );
    }

    #[test]
    fn map_malformed_text_passes_through() {
        assert_eq!(coerce_value(json!("k=1"), ParamType::Map), json!("k=1"));
        assert_eq!(coerce_value(json!("[1]"), ParamType::Map), json!("[1]"));
    }

    #[test]
    fn non_text_values_are_untouched() {
        assert_eq!(coerce_value(json!([1]), ParamType::List), json!([1]));
        assert_eq!(coerce_value(Value::Null, ParamType::List), Value::Null);
        assert_eq!(coerce_value(json!("3"), ParamType::Integer), json!("3"));
    }

    #[test]
    fn parse_text_scalars() {
        assert_eq!(parse_text("42", ParamType::Integer), Ok(json!(42)));
        assert_eq!(parse_text("2.5", ParamType::Number), Ok(json!(2.5)));
        assert_eq!(parse_text("Yes", ParamType::Boolean), Ok(json!(true)));
        assert_eq!(parse_text("abc", ParamType::String), Ok(json!("abc")));
        assert!(parse_text("abc", ParamType::Integer).is_err());
        assert!(parse_text("maybe", ParamType::Boolean).is_err());
    }

    #[test]
    fn spec_builders_set_source_and_default() {
        let spec = ParameterSpec::with_default("value", ParamType::Integer, 1).in_body();
        assert_eq!(spec.source, ParamSource::Body);
        assert_eq!(spec.default_value(), Some(&json!(1)));
        assert!(!spec.is_required());
        assert!(ParameterSpec::required("s", ParamType::String).is_required());
        assert_eq!(
            ParameterSpec::optional("goal", ParamType::String).default_value(),
            Some(&Value::Null)
        );
    }
}
