//! Artifact construction
//!
//! [`ExecutableBuilder`] turns a descriptor into its artifact at most once
//! per descriptor generation. How concurrent callers of the same descriptor
//! cooperate is governed by [`BuildPolicy`]:
//!
//! - `Exclusive`: the first caller compiles while later callers of the same
//!   descriptor wait for its result. A waiter gives up after the configured
//!   timeout and compiles on its own, falling back to the optimistic path.
//!   If the build fails, the callers already waiting share its error.
//!   Nested builds (includes) never wait: they already hold their parents'
//!   gates, so a busy gate is bypassed with an independent compile.
//! - `Optimistic`: nobody waits. Every caller that finds the slot empty
//!   compiles, the first finished artifact is installed, and later results
//!   are discarded.
//!
//! A failed compile installs nothing, so the next caller retries.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::descriptor::{Artifact, Claim, DocumentDescriptor};
use crate::attributes::Attributes;
use crate::error::{DocumentError, ErrorKind};
use crate::language::{AdapterRegistry, CompileUnit, IncludeResolver};
use crate::logging::{operations, status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPolicy {
    #[default]
    Exclusive,
    Optimistic,
}

impl std::str::FromStr for BuildPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exclusive" => Ok(Self::Exclusive),
            "optimistic" => Ok(Self::Optimistic),
            other => Err(format!(
                "unknown build policy '{}' (expected exclusive or optimistic)",
                other
            )),
        }
    }
}

/// Counters since the builder was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Adapter invocations
    pub attempted: u64,
    /// Artifacts that won their slot
    pub installed: u64,
    /// Artifacts dropped because another caller installed first
    pub discarded: u64,
    /// Adapter invocations that failed
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    attempted: AtomicU64,
    installed: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
}

pub struct ExecutableBuilder {
    registry: Arc<AdapterRegistry>,
    policy: BuildPolicy,
    wait_timeout: Duration,
    counters: Counters,
}

impl ExecutableBuilder {
    pub fn new(registry: Arc<AdapterRegistry>, policy: BuildPolicy, wait_timeout: Duration) -> Self {
        Self {
            registry,
            policy,
            wait_timeout,
            counters: Counters::default(),
        }
    }

    pub fn policy(&self) -> BuildPolicy {
        self.policy
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Artifact of `descriptor`, compiling it if no artifact is installed yet
    pub fn build(
        &self,
        descriptor: &DocumentDescriptor,
        attributes: &Attributes,
        includes: &dyn IncludeResolver,
    ) -> Result<Arc<Artifact>, DocumentError> {
        self.build_with(descriptor, attributes, includes, true)
    }

    /// Like [`build`](Self::build), for a descriptor included by a build in
    /// progress; never waits on another caller
    pub fn build_nested(
        &self,
        descriptor: &DocumentDescriptor,
        attributes: &Attributes,
        includes: &dyn IncludeResolver,
    ) -> Result<Arc<Artifact>, DocumentError> {
        self.build_with(descriptor, attributes, includes, false)
    }

    fn build_with(
        &self,
        descriptor: &DocumentDescriptor,
        attributes: &Attributes,
        includes: &dyn IncludeResolver,
        may_wait: bool,
    ) -> Result<Arc<Artifact>, DocumentError> {
        if let Some(artifact) = descriptor.slot.get() {
            return Ok(Arc::clone(artifact));
        }
        if self.policy == BuildPolicy::Optimistic {
            return self.compile_and_install(descriptor, attributes, includes);
        }

        let claim = if may_wait {
            descriptor.slot.claim(self.wait_timeout)
        } else {
            descriptor.slot.try_claim()
        };

        match claim {
            Claim::Ready(artifact) => Ok(artifact),
            Claim::Granted(mut ticket) => {
                let result = self.compile_and_install(descriptor, attributes, includes);
                // Loops depend on the builder's own include chain.
                if let Err(err) = &result {
                    if err.kind() != ErrorKind::DependencyLoop {
                        ticket.fail(err);
                    }
                }
                drop(ticket);
                result
            }
            Claim::Failed(err) => {
                debug!(
                    operation = operations::BUILD,
                    status = status::ERROR,
                    document = descriptor.name(),
                    generation = descriptor.generation(),
                    "concurrent build failed: {}",
                    err
                );
                Err(err)
            }
            Claim::Busy => {
                debug!(
                    operation = operations::BUILD,
                    document = descriptor.name(),
                    generation = descriptor.generation(),
                    "nested include is being built elsewhere, compiling independently"
                );
                self.compile_and_install(descriptor, attributes, includes)
            }
            Claim::TimedOut => {
                warn!(
                    operation = operations::BUILD,
                    document = descriptor.name(),
                    generation = descriptor.generation(),
                    "waited {:?} for a concurrent build, compiling independently",
                    self.wait_timeout
                );
                self.compile_and_install(descriptor, attributes, includes)
            }
        }
    }

    pub fn stats(&self) -> BuildStats {
        BuildStats {
            attempted: self.counters.attempted.load(Ordering::Relaxed),
            installed: self.counters.installed.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    fn compile_and_install(
        &self,
        descriptor: &DocumentDescriptor,
        attributes: &Attributes,
        includes: &dyn IncludeResolver,
    ) -> Result<Arc<Artifact>, DocumentError> {
        let artifact = self.compile(descriptor, attributes, includes)?;
        let (installed, won) = descriptor.slot.install(artifact);

        if won {
            self.counters.installed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                operation = operations::BUILD,
                status = status::DISCARDED,
                document = descriptor.name(),
                generation = descriptor.generation(),
                "artifact already installed by another caller"
            );
        }
        Ok(installed)
    }

    fn compile(
        &self,
        descriptor: &DocumentDescriptor,
        attributes: &Attributes,
        includes: &dyn IncludeResolver,
    ) -> Result<Arc<Artifact>, DocumentError> {
        let name = descriptor.name();
        let adapter = self.registry.for_tag(name, descriptor.tag())?;
        let unit = CompileUnit {
            name,
            tag: descriptor.tag(),
            source: descriptor.source(),
            generation: descriptor.generation(),
            attributes,
        };

        self.counters.attempted.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        match adapter.compile(&unit, includes) {
            Ok(program) => {
                debug!(
                    operation = operations::BUILD,
                    status = status::SUCCESS,
                    document = name,
                    tag = descriptor.tag(),
                    generation = descriptor.generation(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "compiled with {}",
                    adapter.name()
                );
                Ok(Arc::new(Artifact::new(
                    name,
                    descriptor.tag(),
                    descriptor.generation(),
                    program,
                )))
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                let err = err.into_document_error(name);
                debug!(
                    operation = operations::BUILD,
                    status = status::ERROR,
                    document = name,
                    kind = %err.kind(),
                    "compile failed: {}",
                    err
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Position;
    use crate::language::{CompileError, LanguageAdapter, Program};
    use crate::source::{Freshness, SourceText};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct NoIncludes;

    impl IncludeResolver for NoIncludes {
        fn include(&self, name: &str, _: Position) -> Result<Arc<Artifact>, DocumentError> {
            Err(DocumentError::not_found(name))
        }
    }

    /// Counts compiles; sleeps so concurrent callers overlap
    struct SlowCounting {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl LanguageAdapter for SlowCounting {
        fn name(&self) -> &str {
            "counting"
        }

        fn tags(&self) -> &[&str] {
            &["cnt"]
        }

        fn compile(
            &self,
            unit: &CompileUnit<'_>,
            _includes: &dyn IncludeResolver,
        ) -> Result<Program, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if unit.source.contains("error") {
                return Err(CompileError::syntax("boom", Position::new(1, 1)));
            }
            Ok(Arc::new(unit.source.to_string()))
        }
    }

    fn setup(policy: BuildPolicy) -> (Arc<SlowCounting>, ExecutableBuilder) {
        let adapter = Arc::new(SlowCounting {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());
        let builder = ExecutableBuilder::new(Arc::new(registry), policy, Duration::from_secs(10));
        (adapter, builder)
    }

    fn descriptor(text: &str, tag: &str) -> DocumentDescriptor {
        DocumentDescriptor::new(
            "doc",
            SourceText {
                text: text.to_string(),
                tag: tag.to_string(),
                freshness: Freshness::from_revision(1),
            },
            1,
            0,
        )
    }

    fn build_concurrently(builder: &ExecutableBuilder, descriptor: &DocumentDescriptor, n: usize) -> Vec<Arc<Artifact>> {
        let attributes = Attributes::new();
        thread::scope(|scope| {
            let handles: Vec<_> = (0..n)
                .map(|_| scope.spawn(|| builder.build(descriptor, &attributes, &NoIncludes).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn test_exclusive_compiles_once() {
        let (adapter, builder) = setup(BuildPolicy::Exclusive);
        let descriptor = descriptor("hello", "cnt");

        let artifacts = build_concurrently(&builder, &descriptor, 8);

        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert!(artifacts.iter().all(|a| Arc::ptr_eq(a, &artifacts[0])));
        assert_eq!(builder.stats().installed, 1);
    }

    #[test]
    fn test_optimistic_installs_single_artifact() {
        let (adapter, builder) = setup(BuildPolicy::Optimistic);
        let descriptor = descriptor("hello", "cnt");

        let artifacts = build_concurrently(&builder, &descriptor, 4);

        let installed = descriptor.artifact().unwrap();
        assert!(artifacts.iter().all(|a| Arc::ptr_eq(a, &installed)));

        let stats = builder.stats();
        assert_eq!(stats.installed, 1);
        assert_eq!(stats.attempted as usize, adapter.calls.load(Ordering::SeqCst));
        assert_eq!(stats.installed + stats.discarded, stats.attempted);
    }

    #[test]
    fn test_failure_is_not_memoized() {
        let (adapter, builder) = setup(BuildPolicy::Exclusive);
        let descriptor = descriptor("error here", "cnt");
        let attributes = Attributes::new();

        let err = builder.build(&descriptor, &attributes, &NoIncludes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parsing);
        assert_eq!(err.stack().origin().unwrap().to_string(), "doc:1:1");
        assert!(descriptor.artifact().is_none());

        builder.build(&descriptor, &attributes, &NoIncludes).unwrap_err();
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(builder.stats().failed, 2);
    }

    #[test]
    fn test_waiters_share_a_failed_build() {
        let (adapter, builder) = setup(BuildPolicy::Exclusive);
        let descriptor = descriptor("error here", "cnt");
        let attributes = Attributes::new();
        let callers = 4;
        let barrier = std::sync::Barrier::new(callers);

        let errors: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..callers)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        builder.build(&descriptor, &attributes, &NoIncludes).unwrap_err()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(errors.iter().all(|err| err.kind() == ErrorKind::Parsing));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);

        // The failure is not remembered for later callers.
        builder.build(&descriptor, &attributes, &NoIncludes).unwrap_err();
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nested_build_bypasses_busy_gate() {
        let (adapter, builder) = setup(BuildPolicy::Exclusive);
        let descriptor = descriptor("hello", "cnt");

        let _held = match descriptor.slot.try_claim() {
            Claim::Granted(ticket) => ticket,
            _ => panic!("free gate should be granted"),
        };

        let start = Instant::now();
        let artifact = builder
            .build_nested(&descriptor, &Attributes::new(), &NoIncludes)
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&artifact, &descriptor.artifact().unwrap()));
    }

    #[test]
    fn test_missing_adapter() {
        let (_adapter, builder) = setup(BuildPolicy::Exclusive);
        let descriptor = descriptor("x", "lua");

        let err = builder
            .build(&descriptor, &Attributes::new(), &NoIncludes)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LanguageAdapterMissing);
        assert_eq!(builder.stats().attempted, 0);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("optimistic".parse::<BuildPolicy>().unwrap(), BuildPolicy::Optimistic);
        assert!("eager".parse::<BuildPolicy>().is_err());
    }
}
