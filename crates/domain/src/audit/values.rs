use std::collections::BTreeMap;

use sentinel_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use super::ResourceType;

/// One scalar carried in an audit payload.
///
/// Floating point values are deliberately unsupported so that the canonical
/// encoding of a payload never depends on number formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// List of UTF-8 text values.
    TextList(Vec<String>),
}

impl From<bool> for AuditValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AuditValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for AuditValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u16> for AuditValue {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for AuditValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for AuditValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for AuditValue {
    fn from(value: Vec<String>) -> Self {
        Self::TextList(value)
    }
}

impl<T: Into<AuditValue>> From<Option<T>> for AuditValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Ordered key/value payload of an audit record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditValues(BTreeMap<String, AuditValue>);

impl AuditValues {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds one entry and returns the payload.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<AuditValue>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    /// Returns one entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AuditValue> {
        self.0.get(key)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AuditValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the payload has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rejects keys that are not part of the resource type's schema.
    pub fn validate_for(&self, resource_type: ResourceType) -> AppResult<()> {
        let allowed = resource_type.value_keys();
        if let Some(key) = self.0.keys().find(|key| !allowed.contains(&key.as_str())) {
            return Err(AppError::Validation(format!(
                "audit value '{key}' is not allowed for resource type '{}'",
                resource_type.as_str()
            )));
        }

        Ok(())
    }
}
