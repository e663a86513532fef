//! Worker-owned endpoint.
//!
//! A [`WorkerOwnedEndpoint`] starts a dedicated thread that opens an
//! [`OwnedEndpoint`] and owns it for its whole life. Other threads never touch
//! the endpoint; they hand the worker one task at a time through a single-slot
//! handoff (a mutex-protected slot plus a condition variable), and the worker
//! runs the task against its endpoint.
//!
//! # States
//!
//! ```text
//! NoThread ──► Starting ──► Idle ──assign_task──► Assigned ──► Running ──┬──► Idle (repeating)
//!                  │                                                     └──► Stopped (single-shot)
//!                  └─────────── startup failure / stop / task error ────────► Stopped
//! ```
//!
//! `NoThread` lasts from [`WorkerOwnedEndpoint::spawn`] until the new thread
//! first runs.
//!
//! A second task is rejected with [`Error::ThreadNotIdle`], never queued.
//!
//! # Stopping
//!
//! [`WorkerOwnedEndpoint::stop`] is cooperative: an idle worker exits at once
//! (a task assigned but not yet started is dropped), a running task is never
//! interrupted. A task blocked in an unbounded receive keeps the worker alive
//! until a message arrives or the context is terminated; long-running tasks
//! should receive with a timeout and check their [`StopToken`].
//!
//! # Task failures
//!
//! A task returning `Err` stops the worker and [`WorkerOwnedEndpoint::join`]
//! returns that error. A task that panics stops the worker and `join` returns
//! [`Error::WorkerPanicked`].

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use singlesock_core::options::EndpointOptions;
use singlesock_core::socket_type::SocketType;
use singlesock_core::transport::Endpoint;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::owned::OwnedEndpoint;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Thread spawned but not yet scheduled
    NoThread,
    /// Thread started, endpoint being opened
    Starting,
    /// Waiting for a task
    Idle,
    /// Task stored, worker not yet running it
    Assigned,
    /// Task executing
    Running,
    /// Thread finished or finishing
    Stopped,
}

impl WorkerState {
    /// Get the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoThread => "NoThread",
            Self::Starting => "Starting",
            Self::Idle => "Idle",
            Self::Assigned => "Assigned",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a worker thread and its endpoint.
///
/// # Examples
///
/// ```
/// use singlesock::WorkerConfig;
///
/// let config = WorkerConfig::new()
///     .with_name("teller")
///     .with_connect("inproc://bank");
/// assert!(config.repeating);
///
/// let once = WorkerConfig::single_shot();
/// assert!(!once.repeating);
/// ```
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Return to Idle after each task (`true`) or stop after the first one
    pub repeating: bool,
    /// Thread name; defaults to `singlesock-<type>-worker`
    pub name: Option<String>,
    /// Thread stack size in bytes; platform default when `None`
    pub stack_size: Option<usize>,
    /// Options the worker's endpoint is opened with
    pub options: EndpointOptions,
    /// Addresses the worker binds before going idle
    pub bind: Vec<String>,
    /// Addresses the worker connects to before going idle
    pub connect: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            repeating: true,
            name: None,
            stack_size: None,
            options: EndpointOptions::default(),
            bind: Vec::new(),
            connect: Vec::new(),
        }
    }
}

impl WorkerConfig {
    /// Repeating worker with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker that stops after its first task.
    pub fn single_shot() -> Self {
        Self::default().with_repeating(false)
    }

    /// Choose between repeating and single-shot mode.
    pub fn with_repeating(mut self, repeating: bool) -> Self {
        self.repeating = repeating;
        self
    }

    /// Name the worker thread.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the worker thread's stack size.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Set the options of the worker's endpoint.
    pub fn with_options(mut self, options: EndpointOptions) -> Self {
        self.options = options;
        self
    }

    /// Bind the worker's endpoint to `address` at startup.
    pub fn with_bind(mut self, address: impl Into<String>) -> Self {
        self.bind.push(address.into());
        self
    }

    /// Connect the worker's endpoint to `address` at startup.
    pub fn with_connect(mut self, address: impl Into<String>) -> Self {
        self.connect.push(address.into());
        self
    }
}

/// Handle a task can poll to notice a stop request.
#[derive(Debug, Clone)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    /// Whether [`WorkerOwnedEndpoint::stop`] was called.
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

type Task<E> = Box<dyn FnOnce(&mut OwnedEndpoint<E>) -> Result<()> + Send + 'static>;

struct Slot<E: Endpoint> {
    state: WorkerState,
    task: Option<Task<E>>,
    completed: u64,
}

struct Shared<E: Endpoint> {
    slot: Mutex<Slot<E>>,
    /// Worker waits here for a task or a stop request
    work: Condvar,
    /// Observers wait here for state changes
    state_changed: Condvar,
}

impl<E: Endpoint> Shared<E> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: WorkerState::NoThread,
                task: None,
                completed: 0,
            }),
            work: Condvar::new(),
            state_changed: Condvar::new(),
        }
    }

    fn transition(&self, state: WorkerState) {
        self.slot.lock().state = state;
        self.state_changed.notify_all();
    }

    fn next_task(&self, stop: &AtomicBool) -> Option<Task<E>> {
        let mut slot = self.slot.lock();
        loop {
            if stop.load(Ordering::SeqCst) {
                if slot.task.take().is_some() {
                    debug!("[WORKER] stop requested, dropping pending task");
                }
                return None;
            }
            if let Some(task) = slot.task.take() {
                slot.state = WorkerState::Running;
                drop(slot);
                self.state_changed.notify_all();
                return Some(task);
            }
            self.work.wait(&mut slot);
        }
    }

    fn task_done(&self, next: WorkerState) {
        let mut slot = self.slot.lock();
        slot.completed += 1;
        slot.state = next;
        drop(slot);
        self.state_changed.notify_all();
    }
}

/// Marks the worker Stopped when its thread exits, including by unwinding.
struct StoppedOnExit<'a, E: Endpoint> {
    shared: &'a Shared<E>,
}

impl<E: Endpoint> Drop for StoppedOnExit<'_, E> {
    fn drop(&mut self) {
        let mut slot = self.shared.slot.lock();
        slot.state = WorkerState::Stopped;
        slot.task = None;
        drop(slot);
        self.shared.state_changed.notify_all();
    }
}

/// Endpoint owned by a dedicated worker thread.
///
/// ```rust
/// use singlesock::{InprocContext, SocketType, WorkerConfig, WorkerOwnedEndpoint};
/// use singlesock_core::inproc::InprocSocket;
///
/// # fn main() -> singlesock::Result<()> {
/// let ctx = InprocContext::new();
/// let mut worker = WorkerOwnedEndpoint::<InprocSocket>::spawn(
///     &ctx,
///     SocketType::Push,
///     WorkerConfig::single_shot().with_bind("inproc://doc-worker"),
/// )?;
/// assert!(worker.wait_until_idle(None));
///
/// worker.assign_task(|endpoint| {
///     assert!(endpoint.is_owner_thread());
///     Ok(())
/// })?;
/// worker.join()?;
/// assert_eq!(worker.tasks_completed(), 1);
/// # Ok(())
/// # }
/// ```
pub struct WorkerOwnedEndpoint<E: Endpoint> {
    shared: Arc<Shared<E>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
    thread_id: ThreadId,
    name: String,
    kind: SocketType,
}

impl<E: Endpoint> WorkerOwnedEndpoint<E> {
    /// Start the worker thread. The thread opens its endpoint, applies the
    /// configured binds and connects, then goes Idle.
    ///
    /// A failure while opening the endpoint stops the worker; it is reported
    /// by [`WorkerOwnedEndpoint::join`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the OS refuses to start the thread.
    pub fn spawn(context: &E::Context, kind: SocketType, config: WorkerConfig) -> Result<Self> {
        let shared = Arc::new(Shared::new());
        let stop = Arc::new(AtomicBool::new(false));
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("singlesock-{}-worker", kind.as_str().to_lowercase()));

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let handle = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            let context = context.clone();
            builder.spawn(move || run_worker::<E>(&shared, &stop, &context, kind, config))?
        };
        let thread_id = handle.thread().id();
        debug!("[WORKER] spawned {} ({:?}) for a {} endpoint", name, thread_id, kind);

        Ok(Self {
            shared,
            stop,
            handle: Some(handle),
            thread_id,
            name,
            kind,
        })
    }

    /// Hand a task to the worker.
    ///
    /// Only succeeds while the worker is Idle and no stop was requested; the
    /// task is stored, the worker is signalled, and the call returns without
    /// waiting for the task to run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotIdle`] carrying the current state otherwise.
    pub fn assign_task<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&mut OwnedEndpoint<E>) -> Result<()> + Send + 'static,
    {
        let mut slot = self.shared.slot.lock();
        if slot.state != WorkerState::Idle || self.stop.load(Ordering::SeqCst) {
            let state = slot.state;
            trace!("[WORKER] {} rejected a task while {}", self.name, state);
            return Err(Error::ThreadNotIdle(state));
        }
        slot.task = Some(Box::new(task));
        slot.state = WorkerState::Assigned;
        drop(slot);

        self.shared.work.notify_one();
        self.shared.state_changed.notify_all();
        trace!("[WORKER] {} assigned a task", self.name);
        Ok(())
    }

    /// Ask the worker to stop. Does not interrupt a running task.
    pub fn stop(&self) {
        let _slot = self.shared.slot.lock();
        if !self.stop.swap(true, Ordering::SeqCst) {
            debug!("[WORKER] stop requested for {}", self.name);
        }
        self.shared.work.notify_all();
    }

    /// Token tasks can poll to notice [`WorkerOwnedEndpoint::stop`].
    pub fn stop_token(&self) -> StopToken {
        StopToken {
            flag: Arc::clone(&self.stop),
        }
    }

    /// Wait for the worker thread to finish.
    ///
    /// A repeating worker only finishes after [`WorkerOwnedEndpoint::stop`], a
    /// task error or a panic. Joining again after a successful join returns
    /// `Ok(())`.
    ///
    /// # Errors
    ///
    /// - [`Error::SelfJoin`] when called from the worker thread
    /// - the error a task or the startup returned
    /// - [`Error::WorkerPanicked`] when a task panicked
    pub fn join(&mut self) -> Result<()> {
        if thread::current().id() == self.thread_id {
            return Err(Error::SelfJoin);
        }
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("[WORKER] {} panicked: {}", self.name, message);
                Err(Error::WorkerPanicked(message))
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.shared.slot.lock().state
    }

    /// Whether the worker accepts a task right now.
    pub fn is_idle(&self) -> bool {
        self.state() == WorkerState::Idle && !self.stop.load(Ordering::SeqCst)
    }

    /// Number of tasks that ran to completion (successfully or not).
    pub fn tasks_completed(&self) -> u64 {
        self.shared.slot.lock().completed
    }

    /// Block until the worker is Idle or Stopped. Returns whether it is Idle;
    /// `false` also when the timeout elapsed first.
    pub fn wait_until_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut slot = self.shared.slot.lock();
        loop {
            match slot.state {
                WorkerState::Idle => return true,
                WorkerState::Stopped => return false,
                _ => {}
            }
            match deadline {
                None => self.shared.state_changed.wait(&mut slot),
                Some(deadline) => {
                    if self
                        .shared
                        .state_changed
                        .wait_until(&mut slot, deadline)
                        .timed_out()
                    {
                        return slot.state == WorkerState::Idle;
                    }
                }
            }
        }
    }

    /// Identifier of the worker thread.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messaging pattern of the worker's endpoint.
    pub fn kind(&self) -> SocketType {
        self.kind
    }
}

impl<E: Endpoint> Drop for WorkerOwnedEndpoint<E> {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        self.stop();
        if thread::current().id() == self.thread_id {
            // Dropped by its own task; the thread exits on its own.
            return;
        }
        if let Err(e) = self.join() {
            warn!("[WORKER] {} finished with an error: {}", self.name, e);
        }
    }
}

impl<E: Endpoint> fmt::Debug for WorkerOwnedEndpoint<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerOwnedEndpoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("thread_id", &self.thread_id)
            .field("state", &self.state())
            .finish()
    }
}

fn run_worker<E: Endpoint>(
    shared: &Shared<E>,
    stop: &AtomicBool,
    context: &E::Context,
    kind: SocketType,
    config: WorkerConfig,
) -> Result<()> {
    // Declared first so it runs after the endpoint is dropped (and closed).
    let _stopped = StoppedOnExit { shared };
    shared.transition(WorkerState::Starting);
    let name = thread::current().name().unwrap_or("worker").to_string();

    let mut endpoint = open_endpoint::<E>(context, kind, &config).map_err(|err| {
        error!("[WORKER] {} failed to open its endpoint: {}", name, err);
        err
    })?;
    shared.transition(WorkerState::Idle);
    debug!("[WORKER] {} idle", name);

    loop {
        let Some(task) = shared.next_task(stop) else {
            debug!("[WORKER] {} stopping", name);
            return Ok(());
        };

        let outcome = task(&mut endpoint);
        let next = if outcome.is_ok() && config.repeating {
            WorkerState::Idle
        } else {
            WorkerState::Running
        };
        shared.task_done(next);

        if let Err(err) = outcome {
            error!("[WORKER] {} task failed: {}", name, err);
            return Err(err);
        }
        if !config.repeating {
            debug!("[WORKER] {} finished its single task", name);
            return Ok(());
        }
    }
}

fn open_endpoint<E: Endpoint>(
    context: &E::Context,
    kind: SocketType,
    config: &WorkerConfig,
) -> Result<OwnedEndpoint<E>> {
    let mut endpoint = OwnedEndpoint::<E>::open(context, kind, config.options.clone())?;
    for address in &config.bind {
        endpoint.bind(address)?;
    }
    for address in &config.connect {
        endpoint.connect(address)?;
    }
    Ok(endpoint)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
