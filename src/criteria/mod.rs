//! Criteria query language
//!
//! - `ast.rs` - criteria tree (`Leaf` / `And` / `Or`) and operators
//! - `parse.rs` - JSON criteria and caller shorthands to trees
//! - `compiler.rs` - trees to SQL WHERE fragments with bound parameters

mod ast;
mod compiler;
mod parse;

pub use ast::{Condition, Criteria, Operator};
pub use compiler::{compile, compile_where};
pub use parse::{Filter, parse_criteria};
