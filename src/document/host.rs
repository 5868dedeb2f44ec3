use std::sync::Arc;
use std::time::Duration;

use super::builder::{BuildPolicy, BuildStats, ExecutableBuilder};
use super::cache::DocumentCache;
use super::dependencies::DependencyChain;
use super::descriptor::{Artifact, DocumentDescriptor};
use crate::attributes::Attributes;
use crate::error::{DocumentError, ErrorFrame, Position};
use crate::language::{AdapterRegistry, IncludeResolver};
use crate::source::SourceProvider;

/// Tunables for a [`DocumentHost`]
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Minimum time between two freshness checks of the same descriptor
    pub min_validity_interval: Duration,
    pub build_policy: BuildPolicy,
    /// Exclusive policy: how long to wait on another caller's build
    pub build_wait_timeout: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            min_validity_interval: Duration::from_secs(1),
            build_policy: BuildPolicy::Exclusive,
            build_wait_timeout: Duration::from_secs(30),
        }
    }
}

/// Composes cache, builder and shared attributes
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct DocumentHost {
    cache: DocumentCache,
    builder: ExecutableBuilder,
    attributes: Attributes,
}

impl DocumentHost {
    pub fn new(provider: Arc<dyn SourceProvider>, registry: AdapterRegistry) -> Self {
        Self::with_options(provider, registry, HostOptions::default())
    }

    pub fn with_options(
        provider: Arc<dyn SourceProvider>,
        registry: AdapterRegistry,
        options: HostOptions,
    ) -> Self {
        Self {
            cache: DocumentCache::new(provider, options.min_validity_interval),
            builder: ExecutableBuilder::new(
                Arc::new(registry),
                options.build_policy,
                options.build_wait_timeout,
            ),
            attributes: Attributes::new(),
        }
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn provider(&self) -> &Arc<dyn SourceProvider> {
        self.cache.provider()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn stats(&self) -> BuildStats {
        self.builder.stats()
    }

    /// Current descriptor without building it
    pub fn resolve(&self, name: &str) -> Result<Arc<DocumentDescriptor>, DocumentError> {
        self.cache.resolve(name)
    }

    /// Resolve and build `name` as a top-level request
    pub fn executable(&self, name: &str) -> Result<Arc<Artifact>, DocumentError> {
        self.executable_in(name, &DependencyChain::new())
    }

    /// Resolve and build `name` on behalf of the documents in `chain`
    pub fn executable_in(
        &self,
        name: &str,
        chain: &DependencyChain,
    ) -> Result<Arc<Artifact>, DocumentError> {
        let nested = !chain.is_empty();
        let chain = chain.enter(name)?;
        let descriptor = self.cache.resolve(name)?;
        let includes = ChainedIncludes {
            host: self,
            chain: &chain,
            document: name,
        };
        if nested {
            self.builder
                .build_nested(&descriptor, &self.attributes, &includes)
        } else {
            self.builder.build(&descriptor, &self.attributes, &includes)
        }
    }
}

/// Include resolution bound to one position in a dependency chain
struct ChainedIncludes<'a> {
    host: &'a DocumentHost,
    chain: &'a DependencyChain,
    document: &'a str,
}

impl IncludeResolver for ChainedIncludes<'_> {
    fn include(&self, name: &str, position: Position) -> Result<Arc<Artifact>, DocumentError> {
        self.host
            .executable_in(name, self.chain)
            .map_err(|err| err.with_frame(ErrorFrame::new(self.document, position)))
    }
}
