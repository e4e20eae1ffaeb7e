//! Synchronous and pooled execution of work units.
//!
//! Every buffer-producing operation validates its arguments on the calling
//! thread and hands back a [`WorkUnit`]. The caller then picks how to run it:
//!
//! - [`Dispatcher::run`] computes it right here and returns the result.
//! - [`Dispatcher::spawn`] runs it on the worker pool and returns a
//!   [`Task`], which is a `Future` and can also be waited on.
//! - [`Dispatcher::submit`] runs it on the worker pool and later invokes a
//!   completion handler on the dispatcher's own thread, from
//!   [`Dispatcher::poll`] or [`Dispatcher::run_until_idle`].
//!
//! Units that are scheduled must own what they use (`'static`). Read-only
//! operations capture an `Arc<Buffer>`, mutating ones take the buffer by
//! value and hand it back, so a buffer can never be changed while a worker
//! is reading it.
//!
//! ```
//! use std::sync::Arc;
//! use pixmat::{ops, Buffer, BufferType, Dispatcher, Region};
//!
//! let dispatcher = Dispatcher::new();
//! let image = Arc::new(Buffer::new(8, 8, BufferType::Gray8)?);
//!
//! let now = dispatcher.run(ops::crop(&*image, Region::new(0, 0, 4, 4))?)?;
//! let later = dispatcher.spawn(ops::crop(image, Region::new(0, 0, 4, 4))?).wait()?;
//! assert_eq!(now, later);
//! # Ok::<(), pixmat::Error>(())
//! ```

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Work units
// ---------------------------------------------------------------------------

/// A deferred computation that runs at most once.
///
/// Built from a compute step and any number of [`map`](Self::map) steps.
/// Failures and panics in any step surface as an error from
/// [`run`](Self::run); they never unwind into the caller.
pub struct WorkUnit<'a, T> {
    label: &'static str,
    job: Box<dyn FnOnce() -> Result<T> + Send + 'a>,
}

impl<'a, T: 'a> WorkUnit<'a, T> {
    /// Wrap a compute step. `label` names the operation in logs and errors.
    pub fn new<F>(label: &'static str, compute: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'a,
    {
        Self {
            label,
            job: Box::new(compute),
        }
    }

    /// Append a step that turns the computed value into the delivered one.
    pub fn map<R, M>(self, mapper: M) -> WorkUnit<'a, R>
    where
        R: 'a,
        M: FnOnce(T) -> Result<R> + Send + 'a,
    {
        let job = self.job;
        WorkUnit {
            label: self.label,
            job: Box::new(move || job().and_then(mapper)),
        }
    }

    /// Name of the operation this unit performs.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Run the unit on the current thread.
    pub fn run(self) -> Result<T> {
        let label = self.label;
        match panic::catch_unwind(AssertUnwindSafe(self.job)) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::warn!("{label} panicked: {message}");
                Err(Error::execution(format!("{label} failed: {message}")))
            }
        }
    }
}

impl<T> core::fmt::Debug for WorkUnit<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkUnit").field("label", &self.label).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Handle to a unit running on the worker pool.
///
/// Await it, or call [`wait`](Self::wait) to block the current thread.
#[must_use = "a task does nothing useful unless its result is awaited or waited on"]
pub struct Task<T> {
    label: &'static str,
    finished: Arc<AtomicBool>,
    result: oneshot::Receiver<Result<T>>,
}

fn worker_gone(label: &'static str) -> Error {
    Error::execution(format!("{label} was dropped by the worker pool before it finished"))
}

impl<T> Task<T> {
    /// Block until the unit has finished and return its result.
    ///
    /// Must not be called from inside an async runtime; `.await` the task
    /// there instead.
    pub fn wait(self) -> Result<T> {
        let label = self.label;
        self.result
            .blocking_recv()
            .unwrap_or_else(|_| Err(worker_gone(label)))
    }

    /// Whether the unit has finished running.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let label = this.label;
        Pin::new(&mut this.result)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(worker_gone(label))))
    }
}

impl<T> core::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("finished", &self.is_finished())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Worker pool configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct DispatchConfig {
    /// Number of worker threads; `None` lets the pool pick one per core.
    pub worker_threads: Option<usize>,
    /// Worker thread names are this prefix followed by `-<index>`.
    pub thread_name_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name_prefix: "pixmat-worker".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Set the number of worker threads.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

enum Pool {
    Global,
    Dedicated(rayon::ThreadPool),
}

type Handler = Box<dyn FnOnce(Box<dyn Any + Send>)>;

struct Completion {
    id: u64,
    label: &'static str,
    result: Box<dyn Any + Send>,
}

/// Runs work units inline or on a worker pool.
///
/// A dispatcher belongs to the thread that created it: completion handlers
/// passed to [`submit`](Self::submit) are stored here and only ever invoked
/// on that thread.
pub struct Dispatcher {
    pool: Pool,
    sender: mpsc::UnboundedSender<Completion>,
    receiver: RefCell<mpsc::UnboundedReceiver<Completion>>,
    handlers: RefCell<HashMap<u64, Handler>>,
    next_id: Cell<u64>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// A dispatcher backed by rayon's global pool.
    pub fn new() -> Self {
        Self::with_pool(Pool::Global)
    }

    /// A dispatcher with its own worker pool.
    pub fn with_config(config: &DispatchConfig) -> Result<Self> {
        let prefix = config.thread_name_prefix.clone();
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(move |i| format!("{prefix}-{i}"));
        if let Some(threads) = config.worker_threads {
            if threads == 0 {
                return Err(Error::invalid("worker_threads must be at least 1"));
            }
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::execution(format!("could not start worker pool: {e}")))?;
        log::debug!(
            "started worker pool with {} threads",
            pool.current_num_threads()
        );
        Ok(Self::with_pool(Pool::Dedicated(pool)))
    }

    fn with_pool(pool: Pool) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            pool,
            sender,
            receiver: RefCell::new(receiver),
            handlers: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    fn execute(&self, job: impl FnOnce() + Send + 'static) {
        match &self.pool {
            Pool::Global => rayon::spawn(job),
            Pool::Dedicated(pool) => pool.spawn(job),
        }
    }

    /// Run `unit` on the calling thread.
    pub fn run<T>(&self, unit: WorkUnit<'_, T>) -> Result<T> {
        log::debug!("running {} inline", unit.label());
        unit.run()
    }

    /// Run `unit` on the worker pool.
    pub fn spawn<T>(&self, unit: WorkUnit<'static, T>) -> Task<T>
    where
        T: Send + 'static,
    {
        let (sender, result) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let worker_finished = Arc::clone(&finished);
        let label = unit.label();
        log::debug!("scheduling {label}");
        self.execute(move || {
            let outcome = unit.run();
            log::debug!("{label} finished (ok: {})", outcome.is_ok());
            worker_finished.store(true, Ordering::Release);
            if sender.send(outcome).is_err() {
                log::debug!("task for {label} dropped; result discarded");
            }
        });
        Task {
            label,
            finished,
            result,
        }
    }

    /// Run `unit` on the worker pool and deliver its result to `handler`.
    ///
    /// The handler runs exactly once, on this dispatcher's thread, during a
    /// later call to [`poll`](Self::poll) or
    /// [`run_until_idle`](Self::run_until_idle).
    pub fn submit<T, H>(&self, unit: WorkUnit<'static, T>, handler: H)
    where
        T: Send + 'static,
        H: FnOnce(Result<T>) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let label = unit.label();
        let deliver: Handler = Box::new(move |payload| match payload.downcast::<Result<T>>() {
            Ok(result) => handler(*result),
            Err(_) => handler(Err(Error::execution(format!(
                "{label} delivered a result of an unexpected type"
            )))),
        });
        self.handlers.borrow_mut().insert(id, deliver);

        log::debug!("scheduling {label} (completion #{id})");
        let sender = self.sender.clone();
        self.execute(move || {
            let result: Box<dyn Any + Send> = Box::new(unit.run());
            if sender.send(Completion { id, label, result }).is_err() {
                log::warn!("dispatcher dropped before {label} finished; result discarded");
            }
        });
    }

    /// Number of submitted units whose handlers have not run yet.
    pub fn pending(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Invoke handlers for every unit that has finished so far, without
    /// blocking. Returns the number of handlers invoked.
    pub fn poll(&self) -> usize {
        let mut delivered = 0;
        loop {
            let Ok(completion) = self.receiver.borrow_mut().try_recv() else {
                break;
            };
            self.deliver(completion);
            delivered += 1;
        }
        delivered
    }

    /// Block until every submitted unit has finished and its handler has run.
    /// Returns the number of handlers invoked.
    ///
    /// Handlers may submit more work; that work is waited for too. Like
    /// [`Task::wait`], this must not be called from inside an async runtime.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        while self.pending() > 0 {
            let Some(completion) = self.receiver.borrow_mut().blocking_recv() else {
                break;
            };
            self.deliver(completion);
            delivered += 1;
        }
        delivered
    }

    fn deliver(&self, completion: Completion) {
        let handler = self.handlers.borrow_mut().remove(&completion.id);
        match handler {
            Some(handler) => {
                log::debug!("delivering {} (completion #{})", completion.label, completion.id);
                handler(completion.result);
            }
            None => log::warn!(
                "no handler for {} (completion #{})",
                completion.label,
                completion.id
            ),
        }
    }
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let pool = match &self.pool {
            Pool::Global => "global",
            Pool::Dedicated(_) => "dedicated",
        };
        f.debug_struct("Dispatcher")
            .field("pool", &pool)
            .field("pending", &self.pending())
            .finish()
    }
}
