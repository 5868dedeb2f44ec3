//! In-memory source provider
//!
//! Documents live in a map guarded by a read-write lock. Every mutation
//! stamps the document with the next value of a provider-wide revision
//! counter, which doubles as its freshness snapshot.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Freshness, SourceProvider, SourceText};
use crate::error::DocumentError;

#[derive(Debug, Clone)]
struct MemoryDocument {
    text: String,
    tag: String,
    revision: u64,
}

#[derive(Debug, Default)]
pub struct MemorySource {
    documents: RwLock<BTreeMap<String, MemoryDocument>>,
    revision: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(self, name: &str, tag: &str, text: &str) -> Self {
        self.insert(name, tag, text);
        self
    }

    /// Insert or replace a document, returning its new revision
    pub fn insert(&self, name: &str, tag: &str, text: &str) -> u64 {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.documents.write().insert(
            name.to_string(),
            MemoryDocument {
                text: text.to_string(),
                tag: tag.to_string(),
                revision,
            },
        );
        revision
    }

    pub fn remove(&self, name: &str) -> bool {
        self.documents.write().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl SourceProvider for MemorySource {
    fn list_names(&self) -> Result<Vec<String>, DocumentError> {
        Ok(self.documents.read().keys().cloned().collect())
    }

    fn read_source(&self, name: &str) -> Result<SourceText, DocumentError> {
        let documents = self.documents.read();
        let doc = documents
            .get(name)
            .ok_or_else(|| DocumentError::not_found(name))?;
        Ok(SourceText {
            text: doc.text.clone(),
            tag: doc.tag.clone(),
            freshness: Freshness::from_revision(doc.revision),
        })
    }

    fn freshness(&self, name: &str) -> Result<Option<Freshness>, DocumentError> {
        Ok(self
            .documents
            .read()
            .get(name)
            .map(|doc| Freshness::from_revision(doc.revision)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_insert_bumps_freshness() {
        let source = MemorySource::new();
        source.insert("a", "tmpl", "one");
        let first = source.freshness("a").unwrap().unwrap();

        source.insert("a", "tmpl", "two");
        let second = source.freshness("a").unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(source.read_source("a").unwrap().text, "two");
    }

    #[test]
    fn test_missing_document() {
        let source = MemorySource::new().with("a", "tmpl", "x");
        assert!(source.freshness("b").unwrap().is_none());
        let err = source.read_source("b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(source.remove("a"));
        assert!(source.is_empty());
    }

    #[test]
    fn test_list_names_sorted() {
        let source = MemorySource::new()
            .with("b", "tmpl", "")
            .with("a", "tmpl", "");
        assert_eq!(source.list_names().unwrap(), vec!["a", "b"]);
    }
}
