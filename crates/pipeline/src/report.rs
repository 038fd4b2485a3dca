//! The parent report entity.
//!
//! A [`Report`] is the externally visible result of an analysis. Its status is
//! mirrored from the paired job record at matching transition points:
//!
//! | Job status | Report status |
//! |------------|---------------|
//! | `queued`   | `pending`     |
//! | `running`  | `processing`  |
//! | `completed`| `completed`   |
//! | `failed`   | `failed`      |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DocumentRef, JobStatus, ReportId, Ticker, Timestamp};

/// Status of a report as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Submitted, waiting for a worker.
    Pending,
    /// Stages are running.
    Processing,
    /// Finished; the artifact is available.
    Completed,
    /// The run aborted.
    Failed,
}

impl ReportStatus {
    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    /// Parses a storage name produced by [`ReportStatus::as_str`].
    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReportStatus::Pending),
            "processing" => Some(ReportStatus::Processing),
            "completed" => Some(ReportStatus::Completed),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }

    /// Returns `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    /// The report status matching a job status.
    pub fn mirroring(job: JobStatus) -> Self {
        match job {
            JobStatus::Queued => ReportStatus::Pending,
            JobStatus::Running => ReportStatus::Processing,
            JobStatus::Completed => ReportStatus::Completed,
            JobStatus::Failed => ReportStatus::Failed,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The finished (or in-progress) result of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Identity shared with the paired job record.
    pub id: ReportId,
    /// The analysed subject.
    pub ticker: Ticker,
    /// Client-facing status.
    pub status: ReportStatus,
    /// The finished artifact: every stage outcome, in execution order.
    pub artifact: Option<Value>,
    /// Rendered document, when the result sink produced one.
    pub document: Option<DocumentRef>,
    /// Submission time.
    pub created_at: Timestamp,
    /// Completion time; set only when the report completes.
    pub completed_at: Option<Timestamp>,
}

impl Report {
    /// Creates a freshly submitted report.
    pub fn pending(id: ReportId, ticker: Ticker) -> Self {
        Self {
            id,
            ticker,
            status: ReportStatus::Pending,
            artifact: None,
            document: None,
            created_at: Timestamp::now(),
            completed_at: None,
        }
    }

    /// Mirrors a job status onto the report.
    ///
    /// A terminal report keeps its status; the completion time is stamped the
    /// first time the report completes.
    pub fn mirror(&mut self, job: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ReportStatus::mirroring(job);
        if self.status == ReportStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(Timestamp::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_mirror_job_statuses() {
        assert_eq!(ReportStatus::mirroring(JobStatus::Queued), ReportStatus::Pending);
        assert_eq!(
            ReportStatus::mirroring(JobStatus::Running),
            ReportStatus::Processing
        );
        assert_eq!(
            ReportStatus::mirroring(JobStatus::Completed),
            ReportStatus::Completed
        );
        assert_eq!(ReportStatus::mirroring(JobStatus::Failed), ReportStatus::Failed);
    }

    #[test]
    fn completion_is_stamped_once() {
        let mut report = Report::pending(ReportId::new(1), Ticker::parse("ACME").unwrap());
        report.mirror(JobStatus::Running);
        assert_eq!(report.completed_at, None);
        report.mirror(JobStatus::Completed);
        let stamped = report.completed_at;
        assert!(stamped.is_some());
        report.mirror(JobStatus::Completed);
        assert_eq!(report.completed_at, stamped);
    }

    #[test]
    fn terminal_report_status_never_changes() {
        let mut report = Report::pending(ReportId::new(3), Ticker::parse("ACME").unwrap());
        report.mirror(JobStatus::Completed);
        report.mirror(JobStatus::Failed);
        assert_eq!(report.status, ReportStatus::Completed);
        assert!(report.completed_at.is_some());

        let mut failed = Report::pending(ReportId::new(4), Ticker::parse("ACME").unwrap());
        failed.mirror(JobStatus::Failed);
        failed.mirror(JobStatus::Completed);
        assert_eq!(failed.status, ReportStatus::Failed);
        assert_eq!(failed.completed_at, None);
    }

    #[test]
    fn failed_report_has_no_completion_time() {
        let mut report = Report::pending(ReportId::new(2), Ticker::parse("ACME").unwrap());
        report.mirror(JobStatus::Failed);
        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.completed_at, None);
    }
}
