use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::error::DocumentError;
use crate::language::Program;
use crate::source::{Freshness, SourceText};

/// Compiled form of one document generation
pub struct Artifact {
    document: String,
    tag: String,
    generation: u64,
    program: Program,
    built_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(document: &str, tag: &str, generation: u64, program: Program) -> Self {
        Self {
            document: document.to_string(),
            tag: tag.to_string(),
            generation,
            program,
            built_at: Utc::now(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Generation of the descriptor this artifact was built from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Adapter program, if it is of type `T`
    pub fn program<T: 'static>(&self) -> Option<&T> {
        self.program.downcast_ref::<T>()
    }

    pub fn raw_program(&self) -> &Program {
        &self.program
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("document", &self.document)
            .field("tag", &self.tag)
            .field("generation", &self.generation)
            .field("built_at", &self.built_at)
            .finish_non_exhaustive()
    }
}

/// Outcome of asking for exclusive build rights on a slot
pub(crate) enum Claim<'a> {
    /// Another caller installed an artifact meanwhile
    Ready(Arc<Artifact>),
    /// The caller is the builder; dropping the ticket wakes waiters
    Granted(BuildTicket<'a>),
    /// The build this caller waited on failed with this error
    Failed(DocumentError),
    /// Another caller is building and the claim did not wait
    Busy,
    /// The in-flight build did not finish within the wait timeout
    TimedOut,
}

#[derive(Default)]
struct Gate {
    building: bool,
    /// Bumped whenever a builder releases the gate
    round: u64,
    /// Failure of the most recently released build
    failure: Option<DocumentError>,
}

/// Write-once artifact slot with an optional build gate
#[derive(Default)]
pub(crate) struct ArtifactSlot {
    artifact: OnceLock<Arc<Artifact>>,
    gate: Mutex<Gate>,
    released: Condvar,
}

impl ArtifactSlot {
    pub(crate) fn get(&self) -> Option<&Arc<Artifact>> {
        self.artifact.get()
    }

    /// Install unless a value is already present
    ///
    /// Returns the artifact held by the slot afterwards and whether it is the
    /// one passed in. A losing artifact is dropped.
    pub(crate) fn install(&self, artifact: Arc<Artifact>) -> (Arc<Artifact>, bool) {
        let mut installed = false;
        let current = self.artifact.get_or_init(|| {
            installed = true;
            artifact
        });
        (Arc::clone(current), installed)
    }

    /// Take the gate, waiting up to `timeout` for an in-flight build
    ///
    /// A caller that waited on a build which then failed receives that
    /// failure. Callers arriving after the release claim the gate afresh.
    pub(crate) fn claim(&self, timeout: Duration) -> Claim<'_> {
        let deadline = Instant::now().checked_add(timeout);
        let mut gate = self.gate.lock();
        let mut waited_on = None;

        loop {
            if let Some(artifact) = self.artifact.get() {
                return Claim::Ready(Arc::clone(artifact));
            }
            if waited_on.is_some_and(|round| round != gate.round) {
                if let Some(err) = &gate.failure {
                    return Claim::Failed(err.clone());
                }
            }
            if !gate.building {
                gate.building = true;
                return Claim::Granted(BuildTicket::new(self));
            }

            waited_on = Some(gate.round);
            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut gate, deadline).timed_out() {
                        return match self.artifact.get() {
                            Some(artifact) => Claim::Ready(Arc::clone(artifact)),
                            None => Claim::TimedOut,
                        };
                    }
                }
                None => self.released.wait(&mut gate),
            }
        }
    }

    /// Take the gate only if nobody holds it
    pub(crate) fn try_claim(&self) -> Claim<'_> {
        let mut gate = self.gate.lock();
        if let Some(artifact) = self.artifact.get() {
            return Claim::Ready(Arc::clone(artifact));
        }
        if gate.building {
            return Claim::Busy;
        }
        gate.building = true;
        Claim::Granted(BuildTicket::new(self))
    }
}

/// Exclusive right to build a slot, released on drop (including unwinding)
pub(crate) struct BuildTicket<'a> {
    slot: &'a ArtifactSlot,
    failure: Option<DocumentError>,
}

impl<'a> BuildTicket<'a> {
    fn new(slot: &'a ArtifactSlot) -> Self {
        Self {
            slot,
            failure: None,
        }
    }

    /// Hand `err` to the callers currently waiting on this build
    pub(crate) fn fail(&mut self, err: &DocumentError) {
        self.failure = Some(err.clone());
    }
}

impl Drop for BuildTicket<'_> {
    fn drop(&mut self) {
        let mut gate = self.slot.gate.lock();
        gate.building = false;
        gate.round = gate.round.wrapping_add(1);
        gate.failure = self.failure.take();
        drop(gate);
        self.slot.released.notify_all();
    }
}

/// Cache entry for one generation of a document
///
/// A descriptor never changes its source: when the document goes stale the
/// cache installs a new descriptor instead, so holders of the old one keep
/// a consistent view.
pub struct DocumentDescriptor {
    name: String,
    tag: String,
    source: String,
    freshness: Freshness,
    generation: u64,
    loaded_at: DateTime<Utc>,
    /// Milliseconds on the owning cache's clock
    last_checked: AtomicU64,
    pub(crate) slot: ArtifactSlot,
}

impl DocumentDescriptor {
    pub(crate) fn new(name: &str, source: SourceText, generation: u64, now_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            tag: source.tag,
            source: source.text,
            freshness: source.freshness,
            generation,
            loaded_at: Utc::now(),
            last_checked: AtomicU64::new(now_ms),
            slot: ArtifactSlot::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Installed artifact, if this generation has been built
    pub fn artifact(&self) -> Option<Arc<Artifact>> {
        self.slot.get().cloned()
    }

    pub(crate) fn last_checked(&self) -> u64 {
        self.last_checked.load(Ordering::Acquire)
    }

    /// Move the check timestamp from `seen` to `now_ms`
    ///
    /// Only one of several concurrent callers that observed the same `seen`
    /// wins; the others skip their freshness check.
    pub(crate) fn begin_check(&self, seen: u64, now_ms: u64) -> bool {
        self.last_checked
            .compare_exchange(seen, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for DocumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentDescriptor")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("generation", &self.generation)
            .field("freshness", &self.freshness)
            .field("built", &self.slot.get().is_some())
            .finish()
    }
}
