//! Bounded fan-out for outbound calls.
//!
//! Submissions enter a FIFO queue drained by a single dispatcher task, which
//! admits one job per free permit of a counting semaphore. Cancelling the
//! executor drops every job that has not been admitted yet; admitted jobs
//! always run to completion.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("task was cancelled before it started")]
    Cancelled,
    #[error("task stopped before producing a result")]
    Aborted,
}

type Job = Box<dyn FnOnce(OwnedSemaphorePermit) + Send>;

/// Resolves when its task finishes, or with an error if it never ran.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<T>,
    cancel: CancellationToken,
}

impl<T> TaskHandle<T> {
    pub async fn join(self) -> Result<T, ExecutorError> {
        self.rx.await.map_err(|_| {
            if self.cancel.is_cancelled() {
                ExecutorError::Cancelled
            } else {
                ExecutorError::Aborted
            }
        })
    }
}

pub struct RateLimitedExecutor {
    queue: mpsc::UnboundedSender<Job>,
    cancel: CancellationToken,
    limit: usize,
}

impl RateLimitedExecutor {
    /// Create an executor running at most `limit` tasks at once (minimum 1).
    /// Must be called inside a tokio runtime.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        let (queue, rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(limit));
        let cancel = CancellationToken::new();

        tokio::spawn(Self::dispatch(rx, semaphore, cancel.clone()));

        Self {
            queue,
            cancel,
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Token that aborts the batch when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drop all queued work; running tasks finish normally.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Queue `task`. It starts once every earlier submission has been
    /// admitted and a slot is free.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |permit| {
            tokio::spawn(async move {
                let output = task.await;
                drop(permit);
                let _ = tx.send(output);
            });
        });

        // A closed queue drops the job, which resolves the handle as cancelled.
        if self.queue.send(job).is_err() {
            tracing::debug!("Executor queue closed, dropping submitted task");
        }

        TaskHandle {
            rx,
            cancel: self.cancel.clone(),
        }
    }

    /// Wait for every handle. Output order matches input order.
    pub async fn await_all<T>(handles: Vec<TaskHandle<T>>) -> Vec<Result<T, ExecutorError>> {
        join_all(handles.into_iter().map(TaskHandle::join)).await
    }

    async fn dispatch(
        mut rx: mpsc::UnboundedReceiver<Job>,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) {
        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => return,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            job(permit);
        }

        rx.close();
        let mut dropped = 0usize;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        tracing::debug!("Executor cancelled, dropped {dropped} queued task(s)");
    }
}
