// ============================================================================
// jsonstore Library
// ============================================================================

pub mod config;
pub mod core;
pub mod criteria;
pub mod dialect;
pub mod driver;
pub mod facade;
pub mod queue;
pub mod result;
pub mod schema;

// Re-export main types for convenience
pub use config::StoreConfig;
pub use core::{KeySchema, KeyType, Row, StoreError, StoreMeta, StoreResult};
pub use criteria::{Criteria, Filter, Operator};
pub use dialect::{Dialect, SqliteDialect};
pub use driver::{Driver, SqliteDriver};
pub use facade::JsonStore;
pub use queue::{OperationQueue, Pending};
pub use result::Outcome;
