//! Operation queue
//!
//! Every operation submitted to a store instance runs on one background
//! worker, strictly one at a time and in submission order. An operation is
//! only started once the previous one has settled, so a multi-statement
//! sequence (BEGIN / upsert / COMMIT) is never interleaved with another
//! caller's statements on the shared connection.
//!
//! Dropping the queue stops accepting work; operations already submitted
//! still run to completion. [`OperationQueue::close`] additionally waits for
//! them.

use crate::core::{StoreError, StoreResult};
use crate::result::Outcome;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Job = BoxFuture<'static, ()>;

pub struct OperationQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OperationQueue {
    /// Start a queue on the current tokio runtime.
    pub fn new() -> StoreResult<Self> {
        let handle = Handle::try_current()
            .map_err(|err| StoreError::backend(format!("operation queue needs a tokio runtime: {}", err)))?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let worker = handle.spawn(async move {
            while let Some(job) = receiver.recv().await {
                job.await;
            }
            debug!("operation queue drained");
        });

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Submit an operation. It is started after every operation submitted
    /// before it has settled; the returned [`Pending`] resolves to its result.
    ///
    /// A panic inside `op` is reported as a `BackendFailure` for that
    /// operation only.
    pub fn enqueue<T, F, Fut>(&self, op: F) -> StoreResult<Pending<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        let job: Job = Box::pin(async move {
            let result = match AssertUnwindSafe(async move { op().await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(panic = %message, "queued operation panicked");
                    Err(StoreError::backend(format!("operation panicked: {}", message)))
                }
            };
            let _ = result_tx.send(result);
        });

        let sender = self.sender.lock()?;
        sender
            .as_ref()
            .ok_or(StoreError::QueueClosed)?
            .send(job)
            .map_err(|_| StoreError::QueueClosed)?;

        Ok(Pending { rx: result_rx })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().map(|sender| sender.is_none()).unwrap_or(true)
    }

    /// Stop accepting operations and wait for the submitted ones to finish.
    pub async fn close(&self) -> StoreResult<()> {
        drop(self.sender.lock()?.take());

        let worker = self.worker.lock()?.take();
        if let Some(worker) = worker {
            worker.await?;
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result of a queued operation.
///
/// Resolves to `QueueClosed` if the queue shut down before the operation
/// produced a result.
#[must_use = "a queued operation's result is only observed by awaiting it"]
pub struct Pending<T> {
    rx: oneshot::Receiver<StoreResult<T>>,
}

impl<T> Pending<T> {
    /// Resolve into the serializable `{success, data, error}` form.
    pub async fn outcome(self) -> Outcome<T> {
        Outcome::from(self.await)
    }
}

impl<T> Future for Pending<T> {
    type Output = StoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(StoreError::QueueClosed)))
    }
}
