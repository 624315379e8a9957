//! Serialized execution scope owning one context.
//!
//! # Responsibility
//! - Confine a `Context` to one dedicated worker thread.
//! - Run submitted jobs strictly one at a time, in submission order.
//! - Let callers either block (`perform_and_wait`) or await (`perform`).
//!
//! # Invariants
//! - Only the worker thread ever touches the owned context.
//! - A panicking job does not take the worker down; its caller observes
//!   `QueueError::Interrupted`.
//! - After shutdown every submission fails with `QueueError::Closed`, even
//!   through handles obtained before shutdown.

use crate::context::{Context, ContextKind};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce(&mut Context) + Send + 'static>;

enum Message {
    Run(Job),
    /// Closes the channel; jobs already queued still run.
    Stop,
}

/// Submission failure for a context queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was shut down before the job could be submitted.
    Closed(ContextKind),
    /// The job was accepted but never produced a result.
    Interrupted(ContextKind),
}

impl Display for QueueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed(kind) => write!(f, "{kind} context queue is closed"),
            Self::Interrupted(kind) => write!(f, "{kind} context job did not complete"),
        }
    }
}

impl Error for QueueError {}

/// Cloneable submission handle to a running queue.
#[derive(Clone)]
pub struct QueueHandle {
    kind: ContextKind,
    sender: mpsc::UnboundedSender<Message>,
}

impl QueueHandle {
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    fn submit<R, F>(&self, job: F) -> Result<oneshot::Receiver<R>, QueueError>
    where
        F: FnOnce(&mut Context) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |ctx: &mut Context| {
            let _ = reply_tx.send(job(ctx));
        });
        self.sender
            .send(Message::Run(job))
            .map_err(|_| QueueError::Closed(self.kind))?;
        Ok(reply_rx)
    }

    /// Runs `job` on the context and blocks the calling thread until it
    /// completes.
    ///
    /// Must not be called from an async runtime worker thread.
    pub fn perform_and_wait<R, F>(&self, job: F) -> Result<R, QueueError>
    where
        F: FnOnce(&mut Context) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(job)?
            .blocking_recv()
            .map_err(|_| QueueError::Interrupted(self.kind))
    }

    /// Runs `job` on the context; the returned future resolves on completion
    /// without blocking other tasks.
    pub async fn perform<R, F>(&self, job: F) -> Result<R, QueueError>
    where
        F: FnOnce(&mut Context) -> R + Send + 'static,
        R: Send + 'static,
    {
        let reply = self.submit(job)?;
        reply.await.map_err(|_| QueueError::Interrupted(self.kind))
    }
}

/// Owner of one context worker thread.
pub struct ContextQueue {
    kind: ContextKind,
    handle: Mutex<Option<QueueHandle>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ContextQueue {
    /// Moves `context` onto a new named worker thread.
    pub fn spawn(context: Context) -> std::io::Result<Self> {
        let kind = context.kind();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();

        let worker = thread::Builder::new()
            .name(format!("ctxstore-{kind}"))
            .spawn(move || {
                let mut context = context;
                while let Some(message) = receiver.blocking_recv() {
                    let job = match message {
                        Message::Run(job) => job,
                        Message::Stop => {
                            receiver.close();
                            continue;
                        }
                    };
                    if catch_unwind(AssertUnwindSafe(|| job(&mut context))).is_err() {
                        error!(
                            "event=context_job module=context status=error context={} error_code=job_panicked",
                            kind
                        );
                    }
                }
                info!("event=context_queue_stop module=context status=ok context={}", kind);
            })?;

        info!("event=context_queue_start module=context status=ok context={}", kind);
        Ok(Self {
            kind,
            handle: Mutex::new(Some(QueueHandle { kind, sender })),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Returns a submission handle, or `Closed` after shutdown.
    pub fn handle(&self) -> Result<QueueHandle, QueueError> {
        self.handle
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(QueueError::Closed(self.kind))
    }

    /// See [`QueueHandle::perform_and_wait`].
    pub fn perform_and_wait<R, F>(&self, job: F) -> Result<R, QueueError>
    where
        F: FnOnce(&mut Context) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle()?.perform_and_wait(job)
    }

    /// See [`QueueHandle::perform`].
    pub async fn perform<R, F>(&self, job: F) -> Result<R, QueueError>
    where
        F: FnOnce(&mut Context) -> R + Send + 'static,
        R: Send + 'static,
    {
        let handle = self.handle()?;
        handle.perform(job).await
    }

    /// Stops accepting jobs, drains already queued ones and joins the worker.
    ///
    /// Outstanding handles do not keep the worker alive. Idempotent. Does not
    /// join when called from the worker thread itself.
    pub fn shutdown(&self) {
        let handle = self.handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = handle.sender.send(Message::Stop);
        }
        let worker = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                error!(
                    "event=context_queue_stop module=context status=error context={} error_code=worker_panicked",
                    self.kind
                );
            }
        }
    }
}

impl Drop for ContextQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
