//! Criteria to SQL compilation
//!
//! A tree is always rendered as a parenthesized group. A bare leaf is
//! treated as a one-element AND group, so `{where: name, =: Mario}` becomes
//! `(("name" = ?))`. A leaf carrying a nested group renders the group after
//! its own comparison, joined with the group's connective:
//! `(("age" > ? OR (("name" = ?))))`.
//!
//! NULL comparisons never bind a parameter: `= NULL` becomes `IS NULL`
//! and `!= NULL` becomes `IS NOT NULL`.

use super::ast::{Condition, Criteria};
use crate::dialect::Dialect;
use serde_json::Value as JsonValue;

#[derive(Clone, Copy)]
enum Connective {
    And,
    Or,
}

impl Connective {
    fn keyword(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }

    /// Rendering of a group with no children.
    fn identity(self) -> &'static str {
        match self {
            Connective::And => "(1 = 1)",
            Connective::Or => "(1 = 0)",
        }
    }
}

struct Compiler<'a> {
    dialect: &'a dyn Dialect,
    params: Option<&'a mut Vec<JsonValue>>,
}

impl Compiler<'_> {
    fn tree(&mut self, criteria: &Criteria) -> String {
        match criteria {
            Criteria::Leaf(_) => self.group(Connective::And, std::slice::from_ref(criteria)),
            Criteria::And(items) => self.group(Connective::And, items),
            Criteria::Or(items) => self.group(Connective::Or, items),
        }
    }

    fn group(&mut self, connective: Connective, items: &[Criteria]) -> String {
        if items.is_empty() {
            return connective.identity().to_string();
        }

        let parts: Vec<String> = items
            .iter()
            .map(|item| match item {
                Criteria::Leaf(condition) => self.condition(condition),
                group => self.tree(group),
            })
            .collect();

        format!("({})", parts.join(&format!(" {} ", connective.keyword())))
    }

    fn condition(&mut self, condition: &Condition) -> String {
        let column = self.dialect.quote_ident(&condition.key);

        let (op, mut operand) = if condition.value.is_null() {
            (condition.op.null_form(), "NULL".to_string())
        } else {
            (condition.op.symbol(), self.operand(&condition.value))
        };

        if let Some(nested) = &condition.nested {
            let (connective, items) = match nested.as_ref() {
                Criteria::And(items) => (Connective::And, items.as_slice()),
                Criteria::Or(items) => (Connective::Or, items.as_slice()),
                leaf => (Connective::And, std::slice::from_ref(leaf)),
            };
            operand.push_str(&format!(
                " {} {}",
                connective.keyword(),
                self.group(connective, items)
            ));
        }

        format!("({} {} {})", column, op, operand)
    }

    fn operand(&mut self, value: &JsonValue) -> String {
        match self.params.as_deref_mut() {
            Some(params) => {
                params.push(value.clone());
                self.dialect.placeholder(params.len())
            }
            None => inline_literal(self.dialect, value),
        }
    }
}

fn inline_literal(dialect: &dyn Dialect, value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(true) => "TRUE".to_string(),
        JsonValue::Bool(false) => "FALSE".to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => dialect.quote_string(s),
        other => dialect.quote_string(&other.to_string()),
    }
}

/// Compile one criteria tree into a SQL boolean expression.
///
/// With a parameter sink, every non-null value is appended to it in
/// left-to-right order and replaced by a placeholder. Without one, values
/// are inlined: numbers and booleans bare, everything else quoted and
/// sanitized by the dialect.
pub fn compile(
    criteria: &Criteria,
    dialect: &dyn Dialect,
    params: Option<&mut Vec<JsonValue>>,
) -> String {
    Compiler { dialect, params }.tree(criteria)
}

/// Compile a caller-level filter list into a ` WHERE ...` clause.
///
/// An empty list compiles to an empty string, which matches every row.
pub fn compile_where(
    criteria: &[Criteria],
    dialect: &dyn Dialect,
    params: Option<&mut Vec<JsonValue>>,
) -> String {
    if criteria.is_empty() {
        return String::new();
    }

    let mut compiler = Compiler { dialect, params };
    let parts: Vec<String> = criteria.iter().map(|c| compiler.tree(c)).collect();
    format!(" WHERE {}", parts.join(" AND "))
}
