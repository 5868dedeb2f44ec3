//! Language adapters
//!
//! An adapter turns source text into a prepared program. Adapters are looked
//! up by the document's tag in an [`AdapterRegistry`] that is populated once
//! at startup and never mutated afterwards.

pub mod template;

pub use template::{Template, TemplateAdapter};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::attributes::Attributes;
use crate::document::Artifact;
use crate::error::{Cause, DocumentError, Position};

/// Prepared representation produced by an adapter, opaque to the host
pub type Program = Arc<dyn Any + Send + Sync>;

/// Everything an adapter sees of the document it compiles
pub struct CompileUnit<'a> {
    pub name: &'a str,
    pub tag: &'a str,
    pub source: &'a str,
    pub generation: u64,
    pub attributes: &'a Attributes,
}

/// Resolves documents included by the one being compiled
///
/// Implementations carry the current dependency chain, so an include that
/// leads back to an in-flight document fails with `DependencyLoop` instead of
/// recursing. Errors already carry the including document's frame.
pub trait IncludeResolver {
    fn include(&self, name: &str, position: Position) -> Result<Arc<Artifact>, DocumentError>;
}

/// Adapter-level failure, converted into a [`DocumentError`] by the builder
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{message}")]
    Syntax { message: String, position: Position },

    #[error("{message}")]
    Preparation {
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    /// An included document failed; passed through unchanged
    #[error(transparent)]
    Include(#[from] DocumentError),
}

impl CompileError {
    pub fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn preparation(message: impl Into<String>) -> Self {
        Self::Preparation {
            message: message.into(),
            cause: None,
        }
    }

    /// Convert into the document error for `document`
    pub fn into_document_error(self, document: &str) -> DocumentError {
        match self {
            Self::Syntax { message, position } => {
                DocumentError::parsing(document, position, message)
            }
            Self::Preparation { message, cause } => {
                DocumentError::preparation(document, message, cause)
            }
            Self::Include(err) => err,
        }
    }
}

pub trait LanguageAdapter: Send + Sync {
    /// Adapter name used by configuration aliases
    fn name(&self) -> &str;

    /// Tags handled by default
    fn tags(&self) -> &[&str];

    fn compile(
        &self,
        unit: &CompileUnit<'_>,
        includes: &dyn IncludeResolver,
    ) -> Result<Program, CompileError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown language adapter: {0}")]
    UnknownAdapter(String),
}

/// Tag -> adapter mapping
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    by_name: HashMap<String, Arc<dyn LanguageAdapter>>,
    by_tag: HashMap<String, Arc<dyn LanguageAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the adapters shipped in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TemplateAdapter));
        registry
    }

    /// Register an adapter under its name and all of its tags
    ///
    /// A later registration for the same tag replaces the earlier one.
    pub fn register(&mut self, adapter: Arc<dyn LanguageAdapter>) {
        for tag in adapter.tags() {
            self.by_tag.insert(tag.to_string(), Arc::clone(&adapter));
        }
        self.by_name.insert(adapter.name().to_string(), adapter);
    }

    /// Route an extra tag to an already registered adapter
    pub fn alias(&mut self, tag: &str, adapter_name: &str) -> Result<(), RegistryError> {
        let adapter = self
            .by_name
            .get(adapter_name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownAdapter(adapter_name.to_string()))?;
        self.by_tag.insert(tag.to_string(), adapter);
        Ok(())
    }

    pub fn contains_adapter(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn for_tag(
        &self,
        document: &str,
        tag: &str,
    ) -> Result<Arc<dyn LanguageAdapter>, DocumentError> {
        self.by_tag
            .get(tag)
            .cloned()
            .ok_or_else(|| DocumentError::adapter_missing(document, tag))
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.by_tag.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_builtin_registry_routes_template_tags() {
        let registry = AdapterRegistry::with_builtin();
        assert_eq!(registry.for_tag("a.tmpl", "tmpl").unwrap().name(), "template");
        assert_eq!(registry.for_tag("a.txt", "txt").unwrap().name(), "template");
    }

    #[test]
    fn test_missing_adapter() {
        let registry = AdapterRegistry::with_builtin();
        let err = registry.for_tag("script.lua", "lua").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::LanguageAdapterMissing);
        assert_eq!(err.document(), Some("script.lua"));
    }

    #[test]
    fn test_alias() {
        let mut registry = AdapterRegistry::with_builtin();
        registry.alias("html", "template").unwrap();
        assert!(registry.for_tag("index.html", "html").is_ok());
        assert!(registry.alias("py", "python").is_err());
    }

    #[test]
    fn test_compile_error_conversion() {
        let err = CompileError::syntax("bad", Position::new(2, 4)).into_document_error("a.tmpl");
        assert_eq!(err.kind(), ErrorKind::Parsing);
        assert_eq!(err.stack().origin().unwrap().to_string(), "a.tmpl:2:4");

        let nested = DocumentError::not_found("b.tmpl");
        let err = CompileError::from(nested).into_document_error("a.tmpl");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.document(), Some("b.tmpl"));
    }
}
