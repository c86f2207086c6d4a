//! Identifier validation
//!
//! Store names become table names and declared keys become column names,
//! so both must be plain SQL identifiers. Names starting with `__` are
//! reserved for the store's own bookkeeping columns and catalog table.

use crate::core::{StoreError, StoreResult};
use lazy_static::lazy_static;
use regex::Regex;

const MAX_IDENTIFIER_LEN: usize = 64;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Validates a store name
pub fn validate_store_name(name: &str) -> StoreResult<()> {
    validate_identifier("store name", name)
}

/// Validates a declared key name
pub fn validate_key_name(name: &str) -> StoreResult<()> {
    validate_identifier("key name", name)
}

fn validate_identifier(kind: &str, name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(format!("Missing parameter: {}", kind)));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "{} '{}' is too long (max {} characters)",
            kind, name, MAX_IDENTIFIER_LEN
        )));
    }

    if !IDENTIFIER.is_match(name) {
        return Err(StoreError::InvalidArgument(format!(
            "{} '{}' must start with a letter or underscore and contain only letters, digits and underscores",
            kind, name
        )));
    }

    if name.starts_with("__") {
        return Err(StoreError::InvalidArgument(format!(
            "{} '{}' is reserved",
            kind, name
        )));
    }

    Ok(())
}
