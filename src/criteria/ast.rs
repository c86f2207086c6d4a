use crate::core::ID_KEY;
use serde_json::Value as JsonValue;
use std::fmt;

/// Comparison operator of a leaf criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::Eq,
        Operator::Ne,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    /// Operator used when the compared value is NULL.
    pub fn null_form(&self) -> &'static str {
        match self {
            Operator::Ne => "IS NOT",
            _ => "IS",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single key comparison, optionally followed by a nested group that is
/// joined to it with the group's own connective.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub key: String,
    pub op: Operator,
    pub value: JsonValue,
    pub nested: Option<Box<Criteria>>,
}

/// Boolean expression tree over key comparisons.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Leaf(Condition),
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
}

impl Criteria {
    pub fn compare(key: impl Into<String>, op: Operator, value: impl Into<JsonValue>) -> Self {
        Criteria::Leaf(Condition {
            key: key.into(),
            op,
            value: value.into(),
            nested: None,
        })
    }

    pub fn eq(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::compare(key, Operator::Eq, value)
    }

    /// Match-by-identifier shorthand.
    pub fn id(value: impl Into<JsonValue>) -> Self {
        Self::compare(ID_KEY, Operator::Eq, value)
    }

    pub fn and(items: Vec<Criteria>) -> Self {
        Criteria::And(items)
    }

    pub fn or(items: Vec<Criteria>) -> Self {
        Criteria::Or(items)
    }

    /// Attach a nested group to a leaf. Non-leaf criteria are wrapped in an
    /// `And` together with the nested group instead.
    pub fn with_nested(self, nested: Criteria) -> Self {
        match self {
            Criteria::Leaf(mut condition) => {
                condition.nested = Some(Box::new(nested));
                Criteria::Leaf(condition)
            }
            other => Criteria::And(vec![other, nested]),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Criteria::Leaf(_))
    }

    /// Every key compared anywhere in the tree, in visiting order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Criteria::Leaf(condition) => {
                keys.push(condition.key.as_str());
                if let Some(nested) = &condition.nested {
                    nested.collect_keys(keys);
                }
            }
            Criteria::And(items) | Criteria::Or(items) => {
                for item in items {
                    item.collect_keys(keys);
                }
            }
        }
    }
}
