//! Document persistence.

pub mod file;
pub mod memory;

use thiserror::Error;

use crate::core::{DocId, Document};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Blocking persistence for documents, keyed by id.
///
/// A binder issues at most one `store` at a time for its own document;
/// implementations must tolerate concurrent calls for different documents.
/// `store` is an idempotent overwrite.
pub trait DocumentStore: Send + Sync {
    fn fetch(&self, id: &DocId) -> Result<Document, StoreError>;
    fn store(&self, doc: &Document) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(DocId),

    #[error("document id not storable: {0}")]
    InvalidId(DocId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("document encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
