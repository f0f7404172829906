//! Documents and their identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque document identifier.
///
/// The core never interprets the contents; stores may impose their own
/// restrictions (the file store rejects ids that would escape its root).
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A document as owned by a binder and persisted by a store.
///
/// `content` is unicode text; every offset and length in the edit algebra
/// counts code points, never bytes. Title and description are informational
/// and ride along untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub description: String,
    pub content: String,
}

impl Document {
    pub fn new(
        id: DocId,
        title: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            content: content.into(),
        }
    }

    /// Content length in code points.
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
