//! Include-chain tracking
//!
//! A `DependencyChain` records the documents in flight on one logical call
//! path. It is an immutable persistent list: `enter` returns a longer chain
//! and leaves the receiver untouched, so leaving a document is simply
//! dropping the longer value when the call returns.

use std::fmt;
use std::sync::Arc;

use crate::error::DocumentError;

struct Link {
    name: String,
    parent: Option<Arc<Link>>,
    depth: usize,
}

#[derive(Clone, Default)]
pub struct DependencyChain {
    head: Option<Arc<Link>>,
}

impl DependencyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name`, failing with `DependencyLoop` if it is already in flight
    pub fn enter(&self, name: &str) -> Result<DependencyChain, DocumentError> {
        if self.contains(name) {
            return Err(DocumentError::dependency_loop(&self.names(), name));
        }

        Ok(Self {
            head: Some(Arc::new(Link {
                name: name.to_string(),
                parent: self.head.clone(),
                depth: self.depth() + 1,
            })),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.iter_newest_first().any(|entry| entry == name)
    }

    /// Document currently being resolved
    pub fn current(&self) -> Option<&str> {
        self.head.as_deref().map(|link| link.name.as_str())
    }

    pub fn depth(&self) -> usize {
        self.head.as_ref().map_or(0, |link| link.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Names in flight, origin first
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.iter_newest_first().map(str::to_string).collect();
        names.reverse();
        names
    }

    fn iter_newest_first(&self) -> impl Iterator<Item = &str> {
        let mut next = self.head.as_deref();
        std::iter::from_fn(move || {
            let link = next?;
            next = link.parent.as_deref();
            Some(link.name.as_str())
        })
    }
}

impl fmt::Debug for DependencyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_enter_appends() {
        let root = DependencyChain::new();
        let a = root.enter("a").unwrap();
        let b = a.enter("b").unwrap();

        assert!(root.is_empty());
        assert_eq!(a.names(), vec!["a"]);
        assert_eq!(b.names(), vec!["a", "b"]);
        assert_eq!(b.current(), Some("b"));
        assert_eq!(b.depth(), 2);
    }

    #[test]
    fn test_detect_cycle() {
        let chain = DependencyChain::new()
            .enter("a")
            .unwrap()
            .enter("b")
            .unwrap();

        let err = chain.enter("a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyLoop);
        assert!(err.message().contains("a -> b -> a"));
    }

    #[test]
    fn test_detect_self_include() {
        let chain = DependencyChain::new().enter("a").unwrap();
        let err = chain.enter("a").unwrap_err();
        assert!(err.message().contains("a -> a"));
    }

    #[test]
    fn test_sibling_chains_are_independent() {
        let a = DependencyChain::new().enter("a").unwrap();
        let left = a.enter("shared").unwrap();
        let right = a.enter("other").unwrap();

        assert!(left.contains("shared"));
        assert!(!right.contains("shared"));
        assert!(right.enter("shared").is_ok());
    }
}
