//! Document resolution core
//!
//! - [`DocumentCache`]: name -> descriptor, revalidated against the source
//! - [`ExecutableBuilder`]: descriptor -> artifact, at most once per generation
//! - [`DependencyChain`]: in-flight documents of one resolution path
//! - [`DocumentHost`]: the three composed, plus host-scoped attributes

pub mod builder;
pub mod cache;
pub mod dependencies;
pub mod descriptor;
pub mod host;

pub use builder::{BuildPolicy, BuildStats, ExecutableBuilder};
pub use cache::DocumentCache;
pub use dependencies::DependencyChain;
pub use descriptor::{Artifact, DocumentDescriptor};
pub use host::{DocumentHost, HostOptions};
