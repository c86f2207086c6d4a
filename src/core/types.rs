use super::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Column holding the full serialized document.
pub const DOCUMENT_COLUMN: &str = "__jsondata";
/// Column holding the row creation timestamp.
pub const CREATED_COLUMN: &str = "__created";
/// Shared catalog table recording every store's declared keys.
pub const META_TABLE: &str = "__meta";
/// The primary key every store carries.
pub const ID_KEY: &str = "id";

/// A row returned by the backend, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Declared type of an indexed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    Number,
}

impl KeyType {
    /// Coerce a caller-supplied type name. Anything that is not
    /// `number` (case-insensitive) becomes `string`.
    pub fn coerce(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("number") {
            KeyType::Number
        } else {
            KeyType::String
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::Number => "number",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered mapping of declared key name to key type.
///
/// Declaration order is preserved and becomes the column order of the
/// backing table and the key order recorded in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySchema {
    keys: Vec<(String, KeyType)>,
}

impl KeySchema {
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Declare a key. Re-declaring an existing key replaces its type and
    /// keeps its original position.
    pub fn key(mut self, name: impl Into<String>, key_type: KeyType) -> Self {
        self.insert(name, key_type);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, key_type: KeyType) {
        let name = name.into();
        match self.keys.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = key_type,
            None => self.keys.push((name, key_type)),
        }
    }

    /// Build from a JSON object such as `{"name": "string", "age": "Number"}`.
    /// Type names are coerced with [`KeyType::coerce`]; non-string type
    /// values are stringified first.
    pub fn from_json(value: &JsonValue) -> StoreResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| StoreError::invalid("keys must be a JSON object"))?;

        let mut schema = Self::new();
        for (name, type_value) in obj {
            let type_name = match type_value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            schema.insert(name.clone(), KeyType::coerce(&type_name));
        }
        Ok(schema)
    }

    /// Ensure the `id` key exists, appending it as a number key if absent.
    pub fn with_default_id(mut self) -> Self {
        if !self.contains(ID_KEY) {
            self.keys.push((ID_KEY.to_string(), KeyType::Number));
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.iter().any(|(key, _)| key == name)
    }

    pub fn get(&self, name: &str) -> Option<KeyType> {
        self.keys
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, key_type)| *key_type)
    }

    pub fn names(&self) -> Vec<String> {
        self.keys.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, KeyType)> {
        self.keys.iter().map(|(name, key_type)| (name.as_str(), *key_type))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, KeyType)> for KeySchema {
    fn from_iter<I: IntoIterator<Item = (S, KeyType)>>(iter: I) -> Self {
        let mut schema = KeySchema::new();
        for (name, key_type) in iter {
            schema.insert(name, key_type);
        }
        schema
    }
}

/// Catalog entry for one store, as persisted in the `data` column of the
/// catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub keys: Vec<String>,
}

impl StoreMeta {
    pub fn from_schema(schema: &KeySchema) -> Self {
        Self {
            keys: schema.names(),
        }
    }

    pub fn is_declared(&self, key: &str) -> bool {
        self.keys.iter().any(|declared| declared == key)
    }
}

/// Effect of a non-query statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: usize,
    /// Identifier generated by the backend for the last inserted row, if any.
    pub last_insert_id: Option<i64>,
}
