//! Filesystem store: one JSON file per document, atomic rename on write.

use std::fs;
use std::io;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use crate::core::{DocId, Document};

use super::{DocumentStore, StoreError};

/// Persists each document as `<id>.json` under a root directory.
///
/// Writes land in a temporary file in the same directory and are renamed
/// into place, so readers never observe a torn document.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, id: &DocId) -> Result<PathBuf, StoreError> {
        let raw = id.as_str();
        if raw.is_empty() || raw.contains(['/', '\\']) || raw.contains("..") {
            return Err(StoreError::InvalidId(id.clone()));
        }
        Ok(self.root.join(format!("{raw}.json")))
    }
}

impl DocumentStore for FileStore {
    fn fetch(&self, id: &DocId) -> Result<Document, StoreError> {
        let path = self.path_for(id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn store(&self, doc: &Document) -> Result<(), StoreError> {
        let path = self.path_for(&doc.id)?;
        let tmp = NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer(tmp.as_file(), doc)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn doc(id: &str, content: &str) -> Document {
        Document::new(DocId::new(id), "title", "desc", content)
    }

    #[test]
    fn store_and_fetch_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.store(&doc("notes", "héllo")).unwrap();
        let fetched = store.fetch(&DocId::new("notes")).unwrap();
        assert_eq!(fetched.content, "héllo");
        assert_eq!(fetched.title, "title");
    }

    #[test]
    fn overwrite_replaces_the_previous_version() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.store(&doc("notes", "one")).unwrap();
        store.store(&doc("notes", "two")).unwrap();
        assert_eq!(store.fetch(&DocId::new("notes")).unwrap().content, "two");
    }

    #[test]
    fn missing_document_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let err = store.fetch(&DocId::new("absent")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn ids_that_escape_the_root_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for bad in ["../breakout", "a/b", "a\\b", ""] {
            let err = store.store(&doc(bad, "x")).unwrap_err();
            assert!(matches!(err, StoreError::InvalidId(_)), "id {bad:?}");
        }
    }
}
