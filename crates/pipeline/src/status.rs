//! Combined status of a submitted analysis, as exposed to polling clients.

use serde::{Deserialize, Serialize};

use crate::{JobRecord, Progress, Report, ReportId, ReportStatus, Stage, Ticker, Timestamp};

/// Report and job state merged into one client-facing snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    /// Report (and job) identity.
    pub id: ReportId,
    /// The analysed subject.
    pub ticker: Ticker,
    /// Report status.
    pub status: ReportStatus,
    /// Job progress.
    pub progress: Progress,
    /// Stage presently executing.
    pub current_stage: Option<Stage>,
    /// Last job status line.
    pub log_summary: Option<String>,
    /// Failure cause of a failed job.
    pub error_detail: Option<String>,
    /// Submission time.
    pub created_at: Timestamp,
    /// Completion time.
    pub completed_at: Option<Timestamp>,
}

impl AnalysisStatus {
    /// Merges a report with its paired job record.
    pub fn from_records(report: &Report, job: &JobRecord) -> Self {
        let view = job.status_view();
        Self {
            id: report.id,
            ticker: report.ticker.clone(),
            status: report.status,
            progress: view.progress,
            current_stage: view.current_stage,
            log_summary: view.log_summary,
            error_detail: view.error_detail,
            created_at: report.created_at,
            completed_at: report.completed_at,
        }
    }
}

/// One entry of a report listing; the artifact is left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Report identity.
    pub id: ReportId,
    /// The analysed subject.
    pub ticker: Ticker,
    /// Report status.
    pub status: ReportStatus,
    /// Submission time.
    pub created_at: Timestamp,
    /// Completion time.
    pub completed_at: Option<Timestamp>,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id,
            ticker: report.ticker.clone(),
            status: report.status,
            created_at: report.created_at,
            completed_at: report.completed_at,
        }
    }
}
