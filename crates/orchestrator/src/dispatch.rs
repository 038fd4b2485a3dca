//! Job dispatch: a bounded queue feeding a pool of worker tasks.
//!
//! Submitters push `(report_id, subject)` requests onto a [`JobQueue`] and get a
//! [`JobTicket`] back. Each worker pulls one request at a time and hands it to
//! the shared [`Orchestrator`], so runs for different jobs proceed concurrently
//! while each run stays strictly sequential. The orchestrator is unaware of
//! how it was scheduled.

use std::sync::Arc;

use pipeline::{OrchestrationError, ReportId, Ticker};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{Orchestrator, RunOutcome};

/// Sizing of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of concurrent runs.
    pub workers: usize,
    /// Requests that may wait in the queue before `submit` applies back-pressure.
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

/// Errors raised by the queue rather than by a run.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    /// The worker pool has shut down.
    #[error("job queue is closed")]
    QueueClosed,

    /// The worker handling the job went away without reporting an outcome.
    #[error("job {0} was abandoned before reporting an outcome")]
    Abandoned(ReportId),
}

/// One unit of work for the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// The job (and report) to run.
    pub report_id: ReportId,
    /// The subject to analyse.
    pub subject: Ticker,
}

struct Envelope {
    request: JobRequest,
    reply: oneshot::Sender<RunOutcome>,
}

/// Submission handle of the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Envelope>,
}

impl JobQueue {
    /// Queues `request`, waiting for queue capacity if necessary.
    pub async fn submit(&self, request: JobRequest) -> Result<JobTicket, DispatchError> {
        let report_id = request.report_id;
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Envelope { request, reply })
            .await
            .map_err(|_| DispatchError::QueueClosed)?;
        debug!(%report_id, "Job queued");
        Ok(JobTicket {
            report_id,
            receiver,
        })
    }
}

/// Awaitable outcome of a submitted job.
///
/// Dropping the ticket does not cancel the run.
#[derive(Debug)]
pub struct JobTicket {
    report_id: ReportId,
    receiver: oneshot::Receiver<RunOutcome>,
}

impl JobTicket {
    /// The submitted job.
    pub fn report_id(&self) -> ReportId {
        self.report_id
    }

    /// Waits for the run to reach a terminal state.
    pub async fn wait(self) -> Result<RunOutcome, DispatchError> {
        let report_id = self.report_id;
        self.receiver
            .await
            .map_err(|_| DispatchError::Abandoned(report_id))
    }
}

/// The running worker tasks.
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Closes `queue` and waits for the workers to drain the requests already
    /// queued and exit.
    ///
    /// Workers only stop once every clone of the queue has been dropped.
    pub async fn shutdown(mut self, queue: JobQueue) {
        drop(queue);
        while let Some(joined) = self.workers.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

/// Starts `config.workers` workers sharing `orchestrator`.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_workers(
    orchestrator: Arc<Orchestrator>,
    config: WorkerPoolConfig,
) -> (JobQueue, WorkerPool) {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let receiver = Arc::new(Mutex::new(receiver));
    let mut workers = JoinSet::new();
    for worker in 0..config.workers.max(1) {
        let orchestrator = Arc::clone(&orchestrator);
        let receiver = Arc::clone(&receiver);
        workers.spawn(
            worker_loop(orchestrator, receiver).instrument(info_span!("worker", worker)),
        );
    }
    info!(
        workers = config.workers.max(1),
        queue_capacity = config.queue_capacity.max(1),
        "Worker pool started"
    );
    (JobQueue { sender }, WorkerPool { workers })
}

async fn worker_loop(
    orchestrator: Arc<Orchestrator>,
    receiver: Arc<Mutex<mpsc::Receiver<Envelope>>>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(Envelope { request, reply }) = next else {
            break;
        };
        let outcome = run_isolated(Arc::clone(&orchestrator), request).await;
        if reply.send(outcome).is_err() {
            debug!("Submitter stopped waiting for the outcome");
        }
    }
    debug!("Job queue closed; worker exiting");
}

/// Runs one job on its own task so a panicking provider cannot take the
/// worker down with it.
async fn run_isolated(orchestrator: Arc<Orchestrator>, request: JobRequest) -> RunOutcome {
    let JobRequest { report_id, subject } = request;
    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(&subject, report_id).await })
    };
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let cause = format!("analysis run panicked: {join_err}");
            orchestrator.mark_abandoned(report_id, &cause).await;
            Err(OrchestrationError::Invariant(cause))
        }
    };
    match &outcome {
        Ok(summary) => info!(
            %report_id,
            degraded = summary.degraded_stages.len(),
            "Job completed"
        ),
        Err(err) => error!(%report_id, error = %err, "Job did not complete"),
    }
    outcome
}
