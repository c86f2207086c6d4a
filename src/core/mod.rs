pub mod error;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use types::{
    CREATED_COLUMN, DOCUMENT_COLUMN, ExecOutcome, ID_KEY, KeySchema, KeyType, META_TABLE, Row,
    StoreMeta,
};
