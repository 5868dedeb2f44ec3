// Library interface for Scriptorium
// Used by the `scriptorium` binary, integration tests and embedders

pub mod attributes;
pub mod config;
pub mod config_discovery;
pub mod defrost;
pub mod document;
pub mod error;
pub mod language;
pub mod logging;
pub mod source;

// Re-export commonly used types
pub use attributes::Attributes;
pub use config::ScriptoriumConfig;
pub use config_discovery::{discover_config, load_config_with_discovery, LoadedConfig};
pub use defrost::{
    DefrostFailure, DefrostHandle, DefrostOptions, DefrostReport, Defroster, Interrupt,
    WaitOutcome,
};
pub use document::{
    Artifact, BuildPolicy, BuildStats, DependencyChain, DocumentCache, DocumentDescriptor,
    DocumentHost, ExecutableBuilder, HostOptions,
};
pub use error::{DocumentError, ErrorFrame, ErrorKind, ErrorStack, Position};
pub use language::{
    AdapterRegistry, CompileError, CompileUnit, IncludeResolver, LanguageAdapter, Program,
    Template, TemplateAdapter,
};
pub use source::{FilesystemSource, Freshness, MemorySource, SourceProvider, SourceText};
