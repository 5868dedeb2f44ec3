pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemSource;
pub use memory::MemorySource;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::DocumentError;

/// Comparable snapshot of a document's modification state
///
/// Providers choose the meaning (mtime, revision counter); the cache only
/// ever compares two snapshots for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Freshness(u128);

impl Freshness {
    pub fn from_system_time(time: SystemTime) -> Self {
        let nanos = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Self(nanos)
    }

    pub fn from_revision(revision: u64) -> Self {
        Self(u128::from(revision))
    }

    pub fn value(&self) -> u128 {
        self.0
    }
}

/// Raw source of one document
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,
    /// Language hint, usually the file extension
    pub tag: String,
    pub freshness: Freshness,
}

/// Supplier of document sources
///
/// `freshness` must be cheap: the cache calls it on revalidation, which may
/// happen once per throttle interval for every hot document.
pub trait SourceProvider: Send + Sync {
    /// Every document name currently known
    fn list_names(&self) -> Result<Vec<String>, DocumentError>;

    /// Read text, tag and freshness; `NotFound` when the name is unknown
    fn read_source(&self, name: &str) -> Result<SourceText, DocumentError>;

    /// Current freshness, `None` when the document no longer exists
    fn freshness(&self, name: &str) -> Result<Option<Freshness>, DocumentError>;
}
