//! Argument binding: resolving named arguments against declared parameters.
//!
//! Binding is a pure function of the declared parameters and the supplied
//! arguments. For every declared parameter, in declaration order:
//!
//! 1. a supplied argument with the same name wins;
//! 2. otherwise the declared default is used;
//! 3. otherwise binding fails with [`BindError::MissingArgument`].
//!
//! The resolved value is then coerced with [`coerce_value`]; a structured
//! parameter whose coerced value has the wrong shape fails with
//! [`BindError::InvalidArgument`]. Supplied arguments that match no declared
//! parameter are ignored.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::params::{check_shape, coerce_value, ParameterSpec};

/// Named arguments as supplied by a caller.
pub type Arguments = Map<String, Value>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while binding arguments to an operation's parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("missing required argument '{parameter}' for operation '{operation}'")]
    MissingArgument { parameter: String, operation: String },
    #[error("invalid argument '{parameter}' for operation '{operation}': {reason}")]
    InvalidArgument {
        parameter: String,
        operation: String,
        reason: String,
    },
}

impl BindError {
    /// Name of the offending parameter.
    #[must_use]
    pub fn parameter(&self) -> &str {
        match self {
            Self::MissingArgument { parameter, .. } | Self::InvalidArgument { parameter, .. } => {
                parameter
            }
        }
    }
}

/// Error returned by the typed accessors of [`BoundArguments`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("argument '{name}': {reason}")]
pub struct ArgumentError {
    pub name: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// BoundArguments
// ---------------------------------------------------------------------------

/// The argument set a handler is invoked with. Contains exactly one entry per
/// declared parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    values: Map<String, Value>,
}

impl BoundArguments {
    /// Returns the raw bound value of a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns the bound value as a string slice when it is a JSON string.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Deserializes the bound value into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError`] when the parameter is absent or its value does
    /// not deserialize into `T`.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
        let value = self.values.get(name).ok_or_else(|| ArgumentError {
            name: name.to_string(),
            reason: "not bound".to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| ArgumentError {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Like [`parse`](Self::parse), but treats `null` as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError`] when a non-null value does not deserialize.
    pub fn parse_optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ArgumentError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.parse(name).map(Some),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the set and returns the underlying map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.values
    }
}

impl FromIterator<(String, Value)> for BoundArguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// bind
// ---------------------------------------------------------------------------

/// Binds `arguments` against `params` for the named operation.
///
/// # Errors
///
/// Returns [`BindError::MissingArgument`] for the first required parameter
/// that has neither a supplied value nor a default, and
/// [`BindError::InvalidArgument`] for a list or map parameter bound to a
/// value of another shape.
pub fn bind(
    operation: &str,
    params: &[ParameterSpec],
    arguments: &Arguments,
) -> Result<BoundArguments, BindError> {
    let mut values = Map::new();
    for param in params {
        let raw = match arguments.get(&param.name) {
            Some(value) => value.clone(),
            None => match param.default_value() {
                Some(default) => default.clone(),
                None => {
                    return Err(BindError::MissingArgument {
                        parameter: param.name.clone(),
                        operation: operation.to_string(),
                    })
                }
            },
        };
        let value = coerce_value(raw, param.ty);
        check_shape(&value, param.ty).map_err(|reason| BindError::InvalidArgument {
            parameter: param.name.clone(),
            operation: operation.to_string(),
            reason,
        })?;
        values.insert(param.name.clone(), value);
    }
    Ok(BoundArguments { values })
}
