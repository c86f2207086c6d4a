//! Document store façade
//!
//! [`JsonStore`] validates caller input, normalizes filters and hands each
//! operation to its queue, which runs it against the driver.

mod store;

pub use store::JsonStore;
