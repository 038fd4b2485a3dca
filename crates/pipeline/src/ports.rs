//! Port traits implemented by infrastructure crates.
//!
//! The orchestrator depends only on these traits. The `store` crate supplies
//! SQLite and in-memory implementations of the stores and a document-rendering
//! result sink; tests supply their own doubles.

use async_trait::async_trait;

use crate::{
    DocumentRef, JobRecord, Report, ReportId, ReportSummary, SharedContext, SinkError, StoreError,
    Ticker,
};

/// Durable storage for job records.
///
/// `save` must be all-or-nothing: a concurrent `load` sees either the previous
/// record or the new one, never a mix.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Loads the job paired with `id`.
    ///
    /// Returns [`StoreError::NotFound`] when no job exists.
    async fn load_job(&self, id: ReportId) -> Result<JobRecord, StoreError>;

    /// Inserts or replaces the job record.
    async fn save_job(&self, job: &JobRecord) -> Result<(), StoreError>;
}

/// Durable storage for parent report entities.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Creates a `pending` report for `ticker`, assigning its identity.
    async fn create_report(&self, ticker: &Ticker) -> Result<Report, StoreError>;

    /// Loads the report with `id`.
    ///
    /// Returns [`StoreError::NotFound`] when no report exists.
    async fn load_report(&self, id: ReportId) -> Result<Report, StoreError>;

    /// Replaces the stored report.
    async fn save_report(&self, report: &Report) -> Result<(), StoreError>;

    /// Lists at most `limit` reports, most recently created first.
    async fn list_reports(&self, limit: usize) -> Result<Vec<ReportSummary>, StoreError>;
}

/// Final side step run after every stage has finished.
///
/// The analytical artifact is already durable on the report when the sink is
/// invoked; the sink only adds secondary output such as a rendered document.
/// Its errors are logged by the orchestrator and never fail the run.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Finalises the result of `subject`, optionally returning a reference to a
    /// rendered document.
    async fn persist(
        &self,
        subject: &Ticker,
        context: &SharedContext,
    ) -> Result<Option<DocumentRef>, SinkError>;
}
