//! Durable storage for color records.
//!
//! Records are only ever appended, one atomic [`Batch`] at a time, and read
//! back in ascending creation order. Writers and readers use separate SQLite
//! connections so a reader never observes a partially written batch.

mod record;
mod schema;
mod store;

use std::path::PathBuf;

pub use record::{Batch, ColorCandidate, ColorRecord};
pub use store::{RecordStore, StoreEvent};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened. The application can not run without it.
    #[error("failed to open color store at {path:?}: {source}")]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A batch could not be committed; nothing from it was persisted.
    #[error("failed to commit batch: {0}")]
    Write(#[source] rusqlite::Error),
    #[error("failed to read records: {0}")]
    Read(#[source] rusqlite::Error),
    #[error("stored record is invalid: {0}")]
    InvalidRecord(String),
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Only a failure to open the store is fatal; everything else is
    /// recovered by logging and discarding.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Bootstrap { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
