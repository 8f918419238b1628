//! Catalog Auditor Library
//!
//! Rule-based compliance auditing for an artist library on disk: checkers,
//! fixers, the pipeline that ties them together and the stores behind it.

pub mod artist;
pub mod background_jobs;
pub mod bulk;
pub mod config;
pub mod events;
pub mod fixers;
pub mod imaging;
pub mod library_store;
pub mod naming;
pub mod nfo;
pub mod pipeline;
pub mod provider;
pub mod rules;
pub mod server_store;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use artist::Artist;
pub use library_store::{LibraryStores, SqliteLibraryStore};
pub use pipeline::{Pipeline, PipelineError, RunResult};
pub use server_store::{ServerStore, SqliteServerStore};
