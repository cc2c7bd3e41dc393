//! Event dispatcher
//!
//! Work that must not run on the invocation service loop (deferred remote
//! actions, notification delivery, re-announcement) is queued here and run
//! in order by a single worker task. The worker is spawned on first use so
//! a dispatcher can be built outside a runtime.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

type Job = BoxFuture<'static, ()>;

#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    pub jobs_submitted: AtomicU64,
    pub jobs_completed: AtomicU64,
}

struct Worker {
    sender: mpsc::UnboundedSender<Job>,
    handle: JoinHandle<()>,
}

/// Single-worker queue of futures.
pub struct EventDispatcher {
    name: String,
    worker: Mutex<Option<Worker>>,
    metrics: Arc<DispatcherMetrics>,
}

impl EventDispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: Mutex::new(None),
            metrics: Arc::new(DispatcherMetrics::default()),
        }
    }

    /// Queue a job behind every job submitted before it.
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.metrics.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        let mut job: Job = Box::pin(job);

        let mut worker = self.worker.lock();
        if let Some(running) = worker.as_ref() {
            match running.sender.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        trace!(dispatcher = %self.name, "Starting dispatcher worker");
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(receiver, self.metrics.clone()));
        // receiver is alive, the send cannot fail
        let _ = sender.send(job);
        *worker = Some(Worker { sender, handle });
    }

    pub fn metrics(&self) -> &DispatcherMetrics {
        &self.metrics
    }

    /// Number of jobs queued or running.
    pub fn backlog(&self) -> u64 {
        let completed = self.metrics.jobs_completed.load(Ordering::Relaxed);
        self.metrics
            .jobs_submitted
            .load(Ordering::Relaxed)
            .saturating_sub(completed)
    }

    /// Drop queued jobs and stop the worker.
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.handle.abort();
            debug!(dispatcher = %self.name, "Dispatcher stopped");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.handle.abort();
        }
    }
}

async fn run(mut receiver: mpsc::UnboundedReceiver<Job>, metrics: Arc<DispatcherMetrics>) {
    while let Some(job) = receiver.recv().await {
        job.await;
        metrics.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }
}
