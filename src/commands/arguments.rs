//! Bound arguments handed to a command callable.

use crate::error::{DispatchError, Result};
use crate::types::{FromValue, Value};
use std::collections::BTreeMap;

/// Converted and validated arguments, keyed by parameter name.
///
/// Every declared parameter has an entry: optional parameters without a
/// value hold their default (possibly `Value::Null`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    /// Extracts a parameter as a concrete type.
    ///
    /// A missing parameter or a value of the wrong shape is a declaration
    /// mismatch between the callable and its metadata, reported as
    /// `Internal`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.value(name).ok_or_else(|| {
            DispatchError::internal(format!("command has no parameter named '{name}'"))
        })?;
        T::from_value(value).ok_or_else(|| {
            DispatchError::internal(format!(
                "parameter '{name}' holds {}, which does not match the requested type",
                value.kind()
            ))
        })
    }

    /// Returns the raw value of a parameter.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns true if the parameter holds a non-null value.
    pub fn is_set(&self, name: &str) -> bool {
        self.value(name).is_some_and(|v| !v.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
