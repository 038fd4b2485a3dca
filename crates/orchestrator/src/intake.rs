//! Analysis intake and status queries.
//!
//! [`AnalysisService`] is the entry point used by front ends: it validates the
//! ticker, creates the paired report and job records, and hands the job to the
//! worker pool. It also answers status queries and report retrieval.

use std::sync::Arc;

use pipeline::{
    AnalysisStatus, JobRecord, JobStatus, JobStore, Report, ReportId, ReportStore, ReportSummary,
    StoreError, Ticker,
};
use thiserror::Error;
use tracing::{error, info};

use crate::{DispatchError, JobQueue, JobRequest, JobTicket};

/// Number of reports a listing returns unless the caller asks otherwise.
pub const RECENT_REPORTS_LIMIT: usize = 50;

/// Why an analysis could not be submitted.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The ticker symbol is empty, too long, or contains invalid characters.
    #[error("invalid ticker symbol '{0}'")]
    InvalidTicker(String),

    /// The report or job record could not be created.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The job could not be queued; its records were marked failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// A successfully submitted analysis.
#[derive(Debug)]
pub struct Submission {
    /// The freshly created `pending` report.
    pub report: Report,
    /// Awaitable outcome of the run.
    pub ticket: JobTicket,
}

/// Creates analyses and answers status queries.
#[derive(Clone)]
pub struct AnalysisService {
    jobs: Arc<dyn JobStore>,
    reports: Arc<dyn ReportStore>,
    queue: JobQueue,
}

impl AnalysisService {
    /// Creates a service submitting to `queue`.
    pub fn new(jobs: Arc<dyn JobStore>, reports: Arc<dyn ReportStore>, queue: JobQueue) -> Self {
        Self {
            jobs,
            reports,
            queue,
        }
    }

    /// Creates a `pending` report and a `queued` job for `raw_ticker` and
    /// submits the job to the worker pool.
    ///
    /// The ticker is trimmed and upper-cased before use.
    pub async fn create_analysis(&self, raw_ticker: &str) -> Result<Submission, IntakeError> {
        let ticker = Ticker::parse(raw_ticker)
            .ok_or_else(|| IntakeError::InvalidTicker(raw_ticker.to_string()))?;

        let report = self.reports.create_report(&ticker).await?;
        let mut job = JobRecord::queued(report.id);
        if let Err(err) = self.jobs.save_job(&job).await {
            self.orphan(report).await;
            return Err(err.into());
        }

        let request = JobRequest {
            report_id: report.id,
            subject: ticker.clone(),
        };
        let ticket = match self.queue.submit(request).await {
            Ok(ticket) => ticket,
            Err(err) => {
                self.reject(&mut job, report, &err).await;
                return Err(err.into());
            }
        };

        info!(report_id = %report.id, %ticker, "Analysis created");
        Ok(Submission { report, ticket })
    }

    /// Current status of the analysis `id`.
    pub async fn status(&self, id: ReportId) -> Result<AnalysisStatus, StoreError> {
        analysis_status(self.jobs.as_ref(), self.reports.as_ref(), id).await
    }

    /// The most recent `limit` reports, newest first.
    pub async fn list_reports(&self, limit: usize) -> Result<Vec<ReportSummary>, StoreError> {
        self.reports.list_reports(limit).await
    }

    /// The full report `id`, including its artifact and document reference.
    pub async fn report(&self, id: ReportId) -> Result<Report, StoreError> {
        self.reports.load_report(id).await
    }

    /// Marks a report whose job record could not be created as failed.
    async fn orphan(&self, mut report: Report) {
        report.mirror(JobStatus::Failed);
        if let Err(store_err) = self.reports.save_report(&report).await {
            error!(report_id = %report.id, error = %store_err, "Could not mark report without a job failed");
        }
    }

    /// Marks records whose job never reached the queue as failed.
    async fn reject(&self, job: &mut JobRecord, mut report: Report, err: &DispatchError) {
        if job.fail(format!("job could not be scheduled: {err}")).is_err() {
            return;
        }
        report.mirror(job.status());
        if let Err(store_err) = self.reports.save_report(&report).await {
            error!(report_id = %report.id, error = %store_err, "Could not mark unscheduled report failed");
        }
        if let Err(store_err) = self.jobs.save_job(job).await {
            error!(report_id = %report.id, error = %store_err, "Could not mark unscheduled job failed");
        }
    }
}

/// Reads the report and job `id` and merges them into one status snapshot.
pub async fn analysis_status(
    jobs: &dyn JobStore,
    reports: &dyn ReportStore,
    id: ReportId,
) -> Result<AnalysisStatus, StoreError> {
    let report = reports.load_report(id).await?;
    let job = jobs.load_job(id).await?;
    Ok(AnalysisStatus::from_records(&report, &job))
}
