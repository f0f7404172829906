//! In-memory store with no durability.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::{DocId, Document};

use super::{DocumentStore, StoreError};

/// Keeps documents in a map; contents vanish with the process.
pub struct MemoryStore {
    documents: Mutex<HashMap<DocId, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a document without going through a binder.
    pub fn insert(&self, doc: Document) {
        self.documents
            .lock()
            .expect("document map lock")
            .insert(doc.id.clone(), doc);
    }

    pub fn contains(&self, id: &DocId) -> bool {
        self.documents
            .lock()
            .expect("document map lock")
            .contains_key(id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn fetch(&self, id: &DocId) -> Result<Document, StoreError> {
        self.documents
            .lock()
            .expect("document map lock")
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn store(&self, doc: &Document) -> Result<(), StoreError> {
        self.documents
            .lock()
            .expect("document map lock")
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }
}
