//! Long-running backfill jobs, one at a time.

mod executor;
mod models;

pub use executor::{BulkError, BulkExecutor, BulkExecutorSettings};
pub use models::*;
