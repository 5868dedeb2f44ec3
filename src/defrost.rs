//! Bulk parallel prewarming
//!
//! A defrost enumerates every document the host's provider knows at call
//! time and builds each one on a fixed pool of worker threads, using the
//! same resolve + build path as on-demand requests. A failing document is
//! recorded in the batch and never stops its siblings.
//!
//! Completion is broadcast by closing a channel, interruption by closing
//! another, so any number of waiters can block on a batch without missing a
//! wake-up.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::document::DocumentHost;
use crate::error::DocumentError;
use crate::logging::{operations, status};

/// Cloneable interruption token
///
/// Once interrupted a token stays interrupted: waiting on it never clears
/// the flag, so the owner can still observe it after a wait returns.
#[derive(Clone)]
pub struct Interrupt {
    inner: Arc<InterruptInner>,
}

struct InterruptInner {
    flag: AtomicBool,
    // Dropped on interrupt, which wakes every receiver at once.
    wake_tx: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(0);
        Self {
            inner: Arc::new(InterruptInner {
                flag: AtomicBool::new(false),
                wake_tx: Mutex::new(Some(wake_tx)),
                wake_rx,
            }),
        }
    }

    pub fn interrupt(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.wake_tx.lock().take();
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    fn waker(&self) -> &Receiver<()> {
        &self.inner.wake_rx
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DefrostOptions {
    /// Worker threads; clamped to at least one and at most the batch size
    pub concurrency: usize,
    /// Wait for the batch before returning from `defrost`
    pub blocking: bool,
    /// Token observed by blocking waits
    pub interrupt: Interrupt,
}

impl Default for DefrostOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            blocking: false,
            interrupt: Interrupt::new(),
        }
    }
}

impl DefrostOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DefrostFailure {
    pub document: String,
    pub error: DocumentError,
}

/// Snapshot of a batch
#[derive(Debug, Clone)]
pub struct DefrostReport {
    pub total: usize,
    pub completed: usize,
    pub interrupted: bool,
    pub failures: Vec<DefrostFailure>,
    pub elapsed: Duration,
}

impl DefrostReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.completed.saturating_sub(self.failures.len())
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// How a wait on a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Interrupted,
    TimedOut,
}

#[derive(Debug)]
struct BatchState {
    total: usize,
    completed: AtomicUsize,
    interrupted: AtomicBool,
    failures: DashMap<String, DocumentError>,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    started: Instant,
    finished: OnceLock<Duration>,
}

impl BatchState {
    fn new(total: usize) -> Self {
        let (done_tx, done_rx) = bounded(0);
        Self {
            total,
            completed: AtomicUsize::new(0),
            interrupted: AtomicBool::new(false),
            failures: DashMap::new(),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
            started: Instant::now(),
            finished: OnceLock::new(),
        }
    }

    fn record_failure(&self, document: String, error: DocumentError) {
        warn!(
            operation = operations::DEFROST,
            status = status::ERROR,
            document = %document,
            kind = %error.kind(),
            "{}",
            error
        );
        self.failures.insert(document, error);
    }

    fn finish_one(&self) {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed == self.total {
            self.mark_done();
        }
    }

    fn mark_done(&self) {
        if self.done_tx.lock().take().is_some() {
            let elapsed = *self.finished.get_or_init(|| self.started.elapsed());
            info!(
                operation = operations::DEFROST,
                status = status::SUCCESS,
                total = self.total,
                failure_count = self.failures.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "defrost finished"
            );
        }
    }

    fn is_done(&self) -> bool {
        self.completed.load(Ordering::Acquire) >= self.total
    }

    /// Batch duration once finished, time so far otherwise
    fn elapsed(&self) -> Duration {
        self.finished
            .get()
            .copied()
            .unwrap_or_else(|| self.started.elapsed())
    }
}

/// Handle on one defrost batch; clones observe the same batch
#[derive(Clone, Debug)]
pub struct DefrostHandle {
    state: Arc<BatchState>,
    interrupt: Interrupt,
}

impl DefrostHandle {
    pub fn was_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::SeqCst)
    }

    pub fn has_failures(&self) -> bool {
        !self.state.failures.is_empty()
    }

    /// Failures recorded so far, sorted by document name
    pub fn failures(&self) -> Vec<DefrostFailure> {
        let mut failures: Vec<DefrostFailure> = self
            .state
            .failures
            .iter()
            .map(|entry| DefrostFailure {
                document: entry.key().clone(),
                error: entry.value().clone(),
            })
            .collect();
        failures.sort_by(|a, b| a.document.cmp(&b.document));
        failures
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// `(completed, total)`
    pub fn progress(&self) -> (usize, usize) {
        (
            self.state.completed.load(Ordering::Acquire),
            self.state.total,
        )
    }

    /// Interrupt the token this batch was started with
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Block until the batch completes or its token is interrupted
    pub fn wait(&self) -> WaitOutcome {
        self.wait_inner(None)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        self.wait_inner(Some(timeout))
    }

    pub fn report(&self) -> DefrostReport {
        DefrostReport {
            total: self.state.total,
            completed: self.state.completed.load(Ordering::Acquire),
            interrupted: self.was_interrupted(),
            failures: self.failures(),
            elapsed: self.state.elapsed(),
        }
    }

    fn wait_inner(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            if self.state.is_done() {
                return WaitOutcome::Completed;
            }
            if self.interrupt.is_interrupted() {
                self.state.interrupted.store(true, Ordering::SeqCst);
                info!(
                    operation = operations::DEFROST,
                    status = status::INTERRUPTED,
                    completed = self.state.completed.load(Ordering::Acquire),
                    total = self.state.total,
                    "stopped waiting for defrost"
                );
                return WaitOutcome::Interrupted;
            }

            // Both channels only ever disconnect, so any wake-up is followed
            // by a re-check of the flags above.
            match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    select! {
                        recv(self.state.done_rx) -> _ => {},
                        recv(self.interrupt.waker()) -> _ => {},
                        default(remaining) => {
                            if !self.state.is_done() && !self.interrupt.is_interrupted() {
                                return WaitOutcome::TimedOut;
                            }
                        },
                    }
                }
                None => select! {
                    recv(self.state.done_rx) -> _ => {},
                    recv(self.interrupt.waker()) -> _ => {},
                },
            }
        }
    }
}

/// Runs defrost batches against one host
///
/// The latest batch stays inspectable through the defroster itself, so a
/// fire-and-forget caller can check on it later.
pub struct Defroster {
    host: Arc<DocumentHost>,
    latest: Mutex<Option<DefrostHandle>>,
}

impl Defroster {
    pub fn new(host: Arc<DocumentHost>) -> Self {
        Self {
            host,
            latest: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &Arc<DocumentHost> {
        &self.host
    }

    /// Build every document known to the provider right now
    ///
    /// Fails only if the provider cannot enumerate its documents. With
    /// `options.blocking` the call returns once the batch completes or the
    /// interrupt token fires; otherwise it returns immediately.
    pub fn defrost(&self, options: DefrostOptions) -> Result<DefrostHandle, DocumentError> {
        let names = self.host.provider().list_names()?;
        let state = Arc::new(BatchState::new(names.len()));
        let handle = DefrostHandle {
            state: Arc::clone(&state),
            interrupt: options.interrupt.clone(),
        };
        *self.latest.lock() = Some(handle.clone());

        let workers = options.concurrency.clamp(1, names.len().max(1));
        info!(
            operation = operations::DEFROST,
            total = names.len(),
            workers,
            blocking = options.blocking,
            "defrost started"
        );

        if names.is_empty() {
            state.mark_done();
            return Ok(handle);
        }

        let (queue_tx, queue_rx) = unbounded();
        for name in names {
            // The receiver is alive until the workers exit.
            let _ = queue_tx.send(name);
        }
        drop(queue_tx);

        let mut spawned = 0;
        for index in 0..workers {
            let host = Arc::clone(&self.host);
            let queue = queue_rx.clone();
            let state = Arc::clone(&state);
            let worker = thread::Builder::new()
                .name(format!("defrost-{}", index))
                .spawn(move || run_worker(&host, &queue, &state));
            match worker {
                Ok(_) => spawned += 1,
                Err(e) => warn!(operation = operations::DEFROST, "failed to spawn worker: {}", e),
            }
        }

        if spawned == 0 {
            warn!(
                operation = operations::DEFROST,
                "no worker thread available, defrosting on the calling thread"
            );
            run_worker(&self.host, &queue_rx, &state);
        }

        if options.blocking {
            handle.wait();
        }
        Ok(handle)
    }

    /// Handle on the most recent batch
    pub fn latest(&self) -> Option<DefrostHandle> {
        self.latest.lock().clone()
    }

    pub fn was_interrupted(&self) -> bool {
        self.latest().is_some_and(|h| h.was_interrupted())
    }

    pub fn has_failures(&self) -> bool {
        self.latest().is_some_and(|h| h.has_failures())
    }

    pub fn failures(&self) -> Vec<DefrostFailure> {
        self.latest().map(|h| h.failures()).unwrap_or_default()
    }
}

fn run_worker(host: &DocumentHost, queue: &Receiver<String>, state: &BatchState) {
    while let Ok(name) = queue.recv() {
        match panic::catch_unwind(AssertUnwindSafe(|| host.executable(&name))) {
            Ok(Ok(artifact)) => {
                debug!(
                    operation = operations::DEFROST,
                    status = status::SUCCESS,
                    document = %name,
                    generation = artifact.generation(),
                    "defrosted"
                );
            }
            Ok(Err(err)) => state.record_failure(name, err),
            Err(payload) => {
                let message = format!("adapter panicked: {}", panic_message(payload.as_ref()));
                let err = DocumentError::preparation(&name, message, None);
                state.record_failure(name, err);
            }
        }
        state.finish_one();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
