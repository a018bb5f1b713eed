//! Deferred tasks: work a handler queues to run after its response is sent.
//!
//! A handler reaches the queue through [`Request::tasks`](crate::Request::tasks).
//! Scheduling returns immediately. The dispatcher moves the queue into the
//! [`ResponseBody`]; hyper drops that body once it has written the last frame,
//! and the drop hands the queued tasks to the tokio runtime.
//!
//! ```text
//! handler ── schedule(..) ──► DeferredTasks ──► ResponseBody ──► hyper writes
//!                                                                   │
//!                                              tokio::spawn ◄── drop(body)
//! ```
//!
//! Outcomes never reach the client. A task that returns `Err` or panics is
//! logged at `error` level and forgotten.
//!
//! Every spawned run is registered with the router's [`TaskTracker`], so the
//! server can wait for queued work before it returns from a graceful shutdown.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::FutureExt;
use http_body::{Body, Frame, SizeHint};
use http_body_util::Full;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;
type TaskFn = Box<dyn FnOnce() -> TaskFuture + Send + 'static>;

// ── DeferredTask ──────────────────────────────────────────────────────────────

/// A callable bound to its argument, invoked only once the runner gets to it.
pub struct DeferredTask {
    label: String,
    call: TaskFn,
}

impl DeferredTask {
    pub fn new<F, A, Fut, E>(label: impl Into<String>, f: F, arg: A) -> Self
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        A: Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        let call: TaskFn = Box::new(move || -> TaskFuture {
            let fut = f(arg);
            Box::pin(async move { fut.await.map_err(|e| e.to_string()) })
        });
        Self { label: label.into(), call }
    }

    pub fn label(&self) -> &str { &self.label }

    /// Runs the task to completion, logging instead of returning failures.
    pub async fn run(self) {
        let Self { label, call } = self;

        let fut = match std::panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(fut) => fut,
            Err(_) => {
                error!(task = %label, "deferred task panicked");
                return;
            }
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => debug!(task = %label, "deferred task finished"),
            Ok(Err(e)) => error!(task = %label, "deferred task failed: {e}"),
            Err(_) => error!(task = %label, "deferred task panicked"),
        }
    }
}

impl std::fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTask").field("label", &self.label).finish_non_exhaustive()
    }
}

// ── DeferredTasks ─────────────────────────────────────────────────────────────

/// The post-response queue of one request.
///
/// Cloning shares the queue. Tasks run in the order they were scheduled, one
/// after another.
#[derive(Clone, Debug, Default)]
pub struct DeferredTasks {
    queue: Arc<Mutex<Vec<DeferredTask>>>,
    tracker: TaskTracker,
}

impl DeferredTasks {
    /// An empty queue whose runs are registered with `tracker`.
    pub fn tracked(tracker: TaskTracker) -> Self {
        Self { queue: Arc::default(), tracker }
    }

    /// Queues `f(arg)` to run after the response is sent.
    ///
    /// ```rust
    /// use quickserve::{Json, Request};
    /// use serde_json::json;
    ///
    /// async fn write_log(line: String) -> Result<(), std::io::Error> {
    ///     tracing::info!("{line}");
    ///     Ok(())
    /// }
    ///
    /// async fn handler(req: Request) -> Json<serde_json::Value> {
    ///     req.tasks().schedule("write_log", write_log, "hello".to_owned());
    ///     Json(json!({ "message": "scheduled" }))
    /// }
    /// ```
    pub fn schedule<F, A, Fut, E>(&self, label: impl Into<String>, f: F, arg: A)
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        A: Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        self.push(DeferredTask::new(label, f, arg));
    }

    /// Queues an already-built future.
    pub fn schedule_fut<Fut, E>(&self, label: impl Into<String>, fut: Fut)
    where
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        self.push(DeferredTask::new(label, |fut| fut, fut));
    }

    pub fn push(&self, task: DeferredTask) {
        self.lock().push(task);
    }

    pub fn len(&self) -> usize { self.lock().len() }
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    pub(crate) fn take(&self) -> Vec<DeferredTask> {
        std::mem::take(&mut *self.lock())
    }

    /// Drains the queue onto the current tokio runtime, through the tracker.
    pub(crate) fn spawn(&self) {
        let tasks = self.take();
        if tasks.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => self.tracker.spawn_on(
                async move {
                    for task in tasks {
                        task.run().await;
                    }
                },
                &handle,
            ),
            Err(_) => warn!(dropped = tasks.len(), "no tokio runtime, deferred tasks discarded"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DeferredTask>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── TaskTracker ───────────────────────────────────────────────────────────────

/// Keeps hold of every spawned deferred-task run.
///
/// One tracker is shared by all requests a [`Router`](crate::Router) serves.
/// Cloning shares it. Finished runs are reaped whenever a new one is spawned.
#[derive(Clone, Debug, Default)]
pub struct TaskTracker {
    running: Arc<Mutex<JoinSet<()>>>,
}

impl TaskTracker {
    fn spawn_on<F>(&self, run: F, handle: &tokio::runtime::Handle)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.lock();
        while running.try_join_next().is_some() {}
        running.spawn_on(run, handle);
    }

    /// Number of runs spawned and not yet reaped.
    pub fn len(&self) -> usize { self.lock().len() }
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    /// Resolves once every run spawned so far, and every run those spawn in
    /// turn, has finished.
    pub async fn wait(&self) {
        loop {
            let mut running = std::mem::take(&mut *self.lock());
            if running.is_empty() {
                return;
            }
            while let Some(res) = running.join_next().await {
                if let Err(e) = res {
                    error!("deferred task runner aborted: {e}");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── ResponseBody ──────────────────────────────────────────────────────────────

/// The body type handed to hyper.
///
/// Holds the serialised payload plus the request's deferred tasks. The tasks
/// are released on drop, which hyper only does after the body is written (or
/// the connection is gone).
#[derive(Debug)]
pub struct ResponseBody {
    inner: Full<Bytes>,
    tasks: DeferredTasks,
}

impl ResponseBody {
    pub(crate) fn new(bytes: Bytes, tasks: DeferredTasks) -> Self {
        Self { inner: Full::new(bytes), tasks }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.tasks.spawn();
    }
}
