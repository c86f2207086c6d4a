//! Store schema and catalog management
//!
//! - `planner.rs` - DDL/DML plans for creating and deleting stores
//! - `validator.rs` - store and key name validation

mod planner;
mod validator;

pub use planner::{PlannedStatement, plan_create_store, plan_delete_store};
pub use validator::{validate_key_name, validate_store_name};
