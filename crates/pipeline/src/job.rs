//! The job record and its lifecycle.
//!
//! A [`JobRecord`] is the durable progress tracker of one orchestration run.
//! Every mutation goes through a method that enforces the lifecycle:
//!
//! ```text
//! queued ──► running ──► completed
//!   │           │
//!   └───────────┴──────► failed
//! ```
//!
//! Terminal states never change again, progress never moves backwards, and the
//! error detail is written exactly once on the transition to `failed`.

use serde::{Deserialize, Serialize};

use crate::{JobStateError, Progress, ReportId, Stage, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Overall status of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created at intake, not yet picked up by a worker.
    Queued,
    /// An orchestrator is driving the stages.
    Running,
    /// All stages ran (possibly with soft failures) and the run finished.
    Completed,
    /// The run aborted on a hard failure.
    Failed,
}

impl JobStatus {
    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parses a storage name produced by [`JobStatus::as_str`].
    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Returns `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` if a job may move from `from` to `to`.
///
/// A queued job may fail without ever running (e.g. its worker pool shut down
/// before it was picked up).
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    match from {
        JobStatus::Queued => matches!(to, JobStatus::Running | JobStatus::Failed),
        JobStatus::Running => matches!(to, JobStatus::Completed | JobStatus::Failed),
        JobStatus::Completed | JobStatus::Failed => false,
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Durable state describing the progress of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    report_id: ReportId,
    status: JobStatus,
    current_stage: Option<Stage>,
    progress: Progress,
    log_summary: Option<String>,
    error_detail: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl JobRecord {
    /// Creates the record for a freshly submitted analysis.
    pub fn queued(report_id: ReportId) -> Self {
        let now = Timestamp::now();
        Self {
            report_id,
            status: JobStatus::Queued,
            current_stage: None,
            progress: Progress::ZERO,
            log_summary: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a record from its stored fields.
    ///
    /// Only persistence adapters should call this; it performs no lifecycle
    /// validation beyond what the field types guarantee.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        report_id: ReportId,
        status: JobStatus,
        current_stage: Option<Stage>,
        progress: Progress,
        log_summary: Option<String>,
        error_detail: Option<String>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            report_id,
            status,
            current_stage,
            progress,
            log_summary,
            error_detail,
            created_at,
            updated_at,
        }
    }

    /// Identity of the paired report (and of this job).
    pub fn report_id(&self) -> ReportId {
        self.report_id
    }

    /// Overall status.
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// The stage presently executing, if any.
    pub fn current_stage(&self) -> Option<Stage> {
        self.current_stage
    }

    /// Last progress checkpoint.
    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Last human-readable status line.
    pub fn log_summary(&self) -> Option<&str> {
        self.log_summary.as_deref()
    }

    /// Failure cause; present only on failed jobs.
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// When the record was created.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// When the record was last mutated.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Moves a queued job to `running`.
    pub fn start(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Running)?;
        self.touch();
        Ok(())
    }

    /// Marks `stage` as executing and checkpoints its start progress.
    pub fn enter_stage(&mut self, stage: Stage, progress: Progress) -> Result<(), JobStateError> {
        self.require_running()?;
        self.advance(progress)?;
        self.current_stage = Some(stage);
        self.touch();
        Ok(())
    }

    /// Checkpoints progress and overwrites the status line.
    pub fn checkpoint(
        &mut self,
        progress: Progress,
        log_summary: impl Into<String>,
    ) -> Result<(), JobStateError> {
        self.require_running()?;
        self.advance(progress)?;
        self.log_summary = Some(log_summary.into());
        self.touch();
        Ok(())
    }

    /// Finishes the run: `completed`, full progress, no current stage.
    pub fn complete(&mut self, log_summary: impl Into<String>) -> Result<(), JobStateError> {
        self.transition(JobStatus::Completed)?;
        self.progress = Progress::COMPLETE;
        self.current_stage = None;
        self.log_summary = Some(log_summary.into());
        self.touch();
        Ok(())
    }

    /// Aborts the run: `failed` with `cause`, no current stage.
    ///
    /// Progress is left at the last checkpoint so a reader can see how far the
    /// run got.
    pub fn fail(&mut self, cause: impl Into<String>) -> Result<(), JobStateError> {
        self.transition(JobStatus::Failed)?;
        let cause = cause.into();
        self.current_stage = None;
        self.log_summary = Some(format!("Analysis failed: {cause}"));
        self.error_detail = Some(cause);
        self.touch();
        Ok(())
    }

    /// Snapshot of the externally observable fields.
    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            status: self.status,
            progress: self.progress,
            current_stage: self.current_stage,
            log_summary: self.log_summary.clone(),
            error_detail: self.error_detail.clone(),
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), JobStateError> {
        if !can_transition(self.status, to) {
            return Err(JobStateError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    fn require_running(&self) -> Result<(), JobStateError> {
        if self.status == JobStatus::Running {
            Ok(())
        } else {
            Err(JobStateError::NotRunning {
                status: self.status,
            })
        }
    }

    fn advance(&mut self, progress: Progress) -> Result<(), JobStateError> {
        if progress < self.progress {
            return Err(JobStateError::ProgressRegression {
                current: self.progress.as_f64(),
                requested: progress.as_f64(),
            });
        }
        self.progress = progress;
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

// ---------------------------------------------------------------------------
// Observable surface
// ---------------------------------------------------------------------------

/// The job fields a status-polling caller may observe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    /// Overall status.
    pub status: JobStatus,
    /// Last progress checkpoint.
    pub progress: Progress,
    /// Stage presently executing.
    pub current_stage: Option<Stage>,
    /// Last status line.
    pub log_summary: Option<String>,
    /// Failure cause.
    pub error_detail: Option<String>,
}
