// Common test utilities shared across acceptance tests
//
// Every test builds its own host over its own `MemorySource` (or temp
// directory), so tests can run in parallel without sharing cache state.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scriptorium::{
    AdapterRegistry, CompileError, CompileUnit, DocumentHost, HostOptions, IncludeResolver,
    LanguageAdapter, MemorySource, Position, Program,
};

/// Tag handled by [`CountingAdapter`]
pub const COUNTING_TAG: &str = "cnt";

/// Adapter stub that counts compiles
///
/// Source lines are interpreted as:
/// - `include NAME`: include another document
/// - `fail`: syntax error at that line
/// - `panic`: panic inside the adapter
///
/// Anything else is ignored. The program is the source text.
pub struct CountingAdapter {
    total: AtomicUsize,
    per_document: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl CountingAdapter {
    pub fn new() -> Arc<Self> {
        Self::slow(Duration::ZERO)
    }

    /// Sleeps `delay` in every compile so concurrent callers overlap
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            total: AtomicUsize::new(0),
            per_document: Mutex::new(HashMap::new()),
            delay,
        })
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn compiles_of(&self, name: &str) -> usize {
        self.per_document.lock().get(name).copied().unwrap_or(0)
    }
}

impl LanguageAdapter for CountingAdapter {
    fn name(&self) -> &str {
        "counting"
    }

    fn tags(&self) -> &[&str] {
        &[COUNTING_TAG]
    }

    fn compile(
        &self,
        unit: &CompileUnit<'_>,
        includes: &dyn IncludeResolver,
    ) -> Result<Program, CompileError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .per_document
            .lock()
            .entry(unit.name.to_string())
            .or_insert(0) += 1;

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        for (index, line) in unit.source.lines().enumerate() {
            let line_number = index as u32 + 1;
            let line = line.trim();
            if let Some(name) = line.strip_prefix("include ") {
                includes.include(name.trim(), Position::new(line_number, 1))?;
            } else if line == "fail" {
                return Err(CompileError::syntax(
                    "fail requested",
                    Position::new(line_number, 1),
                ));
            } else if line == "panic" {
                panic!("panic requested by {}", unit.name);
            }
        }

        Ok(Arc::new(unit.source.to_string()))
    }
}

/// Builtin adapters plus `adapter`
pub fn registry_with(adapter: Arc<CountingAdapter>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::with_builtin();
    registry.register(adapter);
    registry
}

pub fn host_with(
    source: Arc<MemorySource>,
    adapter: Arc<CountingAdapter>,
    options: HostOptions,
) -> Arc<DocumentHost> {
    Arc::new(DocumentHost::with_options(
        source,
        registry_with(adapter),
        options,
    ))
}

/// `count` counting documents named `doc-00`, `doc-01`, ...
pub fn numbered_source(count: usize) -> MemorySource {
    let source = MemorySource::new();
    for index in 0..count {
        source.insert(&format!("doc-{:02}", index), COUNTING_TAG, "ok\n");
    }
    source
}

/// Options that check freshness on every resolve
pub fn always_validate() -> HostOptions {
    HostOptions {
        min_validity_interval: Duration::ZERO,
        ..HostOptions::default()
    }
}
