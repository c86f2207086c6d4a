//! Criteria parsing
//!
//! Turns caller-supplied JSON such as
//! `{"where": "age", ">": 10, "and": [{"where": "age", "<": 20}]}` into
//! [`Criteria`] trees, and normalizes the shorthands a caller may pass
//! where a filter is expected.
//!
//! Malformed criteria are dropped from the filter in permissive mode, which
//! widens the match. Strict mode reports them as `InvalidArgument` instead.

use super::ast::{Condition, Criteria, Operator};
use crate::core::{StoreError, StoreResult};
use serde_json::Value as JsonValue;
use tracing::debug;

const WHERE: &str = "where";
const AND: &str = "and";
const OR: &str = "or";

/// Parse one criteria tree. `Ok(None)` means "no filter".
pub fn parse_criteria(value: &JsonValue, strict: bool) -> StoreResult<Option<Criteria>> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::Number(_) | JsonValue::String(_) => Ok(Some(Criteria::id(value.clone()))),
        JsonValue::Array(items) => Ok(parse_list(items, strict)?.map(Criteria::And)),
        JsonValue::Object(obj) => {
            if obj.contains_key(WHERE) {
                return parse_leaf(obj, strict);
            }

            match (obj.get(AND), obj.get(OR)) {
                (Some(_), Some(_)) if strict => {
                    malformed("criteria declares both `and` and `or`", value, strict)
                }
                (_, Some(list)) => Ok(parse_group_list(list, strict)?.map(Criteria::Or)),
                (Some(list), None) => Ok(parse_group_list(list, strict)?.map(Criteria::And)),
                (None, None) => malformed("criteria has no `where`, `and` or `or`", value, strict),
            }
        }
        JsonValue::Bool(_) => malformed("boolean is not a criteria", value, strict),
    }
}

fn parse_leaf(
    obj: &serde_json::Map<String, JsonValue>,
    strict: bool,
) -> StoreResult<Option<Criteria>> {
    let raw = JsonValue::Object(obj.clone());

    let key = match obj.get(WHERE) {
        Some(JsonValue::String(key)) if !key.is_empty() => key.clone(),
        _ => return malformed("`where` must be a non-empty string", &raw, strict),
    };

    let mut ops = Operator::ALL
        .into_iter()
        .filter(|op| obj.contains_key(op.symbol()));
    let op = match (ops.next(), ops.next()) {
        (Some(op), None) => op,
        (None, _) => return malformed("criteria declares no operator", &raw, strict),
        (Some(_), Some(_)) => return malformed("criteria declares several operators", &raw, strict),
    };

    let value = obj.get(op.symbol()).cloned().unwrap_or(JsonValue::Null);

    let nested = if let Some(list) = obj.get(AND) {
        parse_group_list(list, strict)?.map(Criteria::And)
    } else if let Some(list) = obj.get(OR) {
        parse_group_list(list, strict)?.map(Criteria::Or)
    } else {
        None
    };

    Ok(Some(Criteria::Leaf(Condition {
        key,
        op,
        value,
        nested: nested.map(Box::new),
    })))
}

/// Children of an `and`/`or` node. A single object is accepted as a
/// one-element list.
fn parse_group_list(value: &JsonValue, strict: bool) -> StoreResult<Option<Vec<Criteria>>> {
    match value {
        JsonValue::Array(items) => parse_list(items, strict),
        other => Ok(parse_criteria(other, strict)?.map(|c| vec![c])),
    }
}

fn parse_list(items: &[JsonValue], strict: bool) -> StoreResult<Option<Vec<Criteria>>> {
    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        if let Some(criteria) = parse_criteria(item, strict)? {
            parsed.push(criteria);
        }
    }

    Ok(if parsed.is_empty() { None } else { Some(parsed) })
}

fn malformed<T>(reason: &str, value: &JsonValue, strict: bool) -> StoreResult<Option<T>> {
    if strict {
        return Err(StoreError::InvalidArgument(format!(
            "malformed criteria {}: {}",
            value, reason
        )));
    }

    debug!(criteria = %value, reason, "dropping malformed criteria");
    Ok(None)
}

/// Caller-level filter: a list of independent criteria trees joined with
/// AND. An empty filter matches every row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    source: FilterSource,
}

#[derive(Debug, Clone, PartialEq)]
enum FilterSource {
    Parsed(Vec<Criteria>),
    Json(JsonValue),
}

impl Default for FilterSource {
    fn default() -> Self {
        FilterSource::Parsed(Vec::new())
    }
}

impl Filter {
    /// Match every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(criteria: Vec<Criteria>) -> Self {
        Self {
            source: FilterSource::Parsed(criteria),
        }
    }

    /// Defer JSON criteria parsing until the store resolves the filter with
    /// its strictness setting.
    pub fn json(value: JsonValue) -> Self {
        Self {
            source: FilterSource::Json(value),
        }
    }

    /// Normalize into the list of criteria trees to compile.
    pub fn resolve(self, strict: bool) -> StoreResult<Vec<Criteria>> {
        match self.source {
            FilterSource::Parsed(criteria) => Ok(criteria),
            FilterSource::Json(JsonValue::Array(items)) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in &items {
                    if let Some(criteria) = parse_criteria(item, strict)? {
                        resolved.push(criteria);
                    }
                }
                Ok(resolved)
            }
            FilterSource::Json(value) => Ok(parse_criteria(&value, strict)?.into_iter().collect()),
        }
    }
}

impl From<Criteria> for Filter {
    fn from(criteria: Criteria) -> Self {
        Filter::new(vec![criteria])
    }
}

impl From<Vec<Criteria>> for Filter {
    fn from(criteria: Vec<Criteria>) -> Self {
        Filter::new(criteria)
    }
}

impl From<Option<Criteria>> for Filter {
    fn from(criteria: Option<Criteria>) -> Self {
        Filter::new(criteria.into_iter().collect())
    }
}

impl From<JsonValue> for Filter {
    fn from(value: JsonValue) -> Self {
        Filter::json(value)
    }
}

impl From<i64> for Filter {
    fn from(id: i64) -> Self {
        Criteria::id(id).into()
    }
}

impl From<&str> for Filter {
    fn from(id: &str) -> Self {
        Criteria::id(id).into()
    }
}

impl From<String> for Filter {
    fn from(id: String) -> Self {
        Criteria::id(id).into()
    }
}
