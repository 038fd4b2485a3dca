//! Error types for the orchestration domain.
//!
//! The taxonomy separates failures by who must react to them:
//!
//! - [`StoreError`]: returned by the job and report stores.
//! - [`StageFault`]: the hard-failure channel of a stage provider. A soft
//!   failure is never an error; it is a [`crate::StageOutcome::Error`] value.
//! - [`SinkError`]: the result sink could not finish; logged, never fatal.
//! - [`JobStateError`] and [`ContextError`]: an attempted mutation would break
//!   a job-record or shared-context invariant.
//! - [`OrchestrationError`]: why a run ended without completing.

use std::time::Duration;

use thiserror::Error;

use crate::{JobStatus, ReportId, Stage};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Which kind of durable record a store operation concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A job record.
    Job,
    /// A parent report entity.
    Report,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecordKind::Job => "job record",
            RecordKind::Report => "report",
        })
    }
}

/// Errors returned by [`crate::JobStore`] and [`crate::ReportStore`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// No record exists for the identity.
    #[error("{kind} {id} not found")]
    NotFound {
        /// The record kind that was looked up.
        kind: RecordKind,
        /// The identity that was looked up.
        id: ReportId,
    },

    /// The backing store could not be reached or failed mid-operation.
    ///
    /// A failed `save` has not applied any part of the record.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Backend-specific description.
        message: String,
    },

    /// A stored row could not be mapped back onto a domain record.
    #[error("corrupt {kind} {id}: {message}")]
    Corrupt {
        /// The record kind that was read.
        kind: RecordKind,
        /// The identity that was read.
        id: ReportId,
        /// What was wrong with the stored value.
        message: String,
    },
}

impl StoreError {
    /// Shorthand for [`StoreError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage providers
// ---------------------------------------------------------------------------

/// An unexpected fault raised while invoking a stage provider.
///
/// Always a hard failure: the orchestrator aborts the run and records the
/// fault's display string as the job's `error_detail`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageFault {
    /// The provider's backing service could not be reached.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The backing service answered with something that is not a stage outcome.
    #[error("protocol violation: {message}")]
    Protocol {
        /// Description of what was malformed.
        message: String,
    },

    /// The provider did not return within the configured stage timeout.
    #[error("stage '{stage}' timed out after {}s", .after.as_secs_f64())]
    TimedOut {
        /// The stage that stalled.
        stage: Stage,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// Any other infrastructure fault (e.g. a dependency's store is down).
    #[error("internal fault: {message}")]
    Internal {
        /// Description of the fault.
        message: String,
    },
}

impl StageFault {
    /// Shorthand for [`StageFault::Transport`].
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Shorthand for [`StageFault::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result sink
// ---------------------------------------------------------------------------

/// The result sink could not finish its side task.
///
/// Never changes the run's outcome; the orchestrator logs it and reports it on
/// the run summary.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The document could not be rendered from the context.
    #[error("render failed: {0}")]
    Render(String),

    /// The rendered document could not be written.
    #[error("document write failed: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

/// A job-record mutation that would violate the record's lifecycle rules.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobStateError {
    /// The status transition is not part of queued → running → terminal.
    #[error("invalid job transition {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },

    /// Progress checkpoints may only move forward.
    #[error("progress may not move backwards ({current} -> {requested})")]
    ProgressRegression {
        /// Current progress value.
        current: f64,
        /// Requested progress value.
        requested: f64,
    },

    /// Stage bookkeeping was attempted while the job was not running.
    #[error("job is {status}, stage checkpoints require a running job")]
    NotRunning {
        /// Current status.
        status: JobStatus,
    },
}

/// A shared-context append that would violate the append-only contract.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    /// The stage already has an entry; entries are never overwritten.
    #[error("stage '{0}' already recorded an outcome")]
    DuplicateStage(Stage),

    /// The stage would be recorded before a stage that precedes it.
    #[error("stage '{stage}' cannot follow '{last}'")]
    OutOfOrder {
        /// The stage being appended.
        stage: Stage,
        /// The most recently appended stage.
        last: Stage,
    },
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Why an orchestration run did not complete.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The job record or report does not exist.
    ///
    /// A caller bug: runs may only be started for records created at intake.
    /// Nothing is written when this is returned.
    #[error("contract violation: {0}")]
    ContractViolation(StoreError),

    /// The job record was not in a state a run can start from.
    #[error("job {id} cannot be run: {source}")]
    NotRunnable {
        /// The job identity.
        id: ReportId,
        /// The rejected transition.
        #[source]
        source: JobStateError,
    },

    /// A stage provider raised a hard fault; the run was marked failed.
    #[error("stage '{stage}' failed: {fault}")]
    Stage {
        /// The stage that faulted.
        stage: Stage,
        /// The fault raised by the provider.
        #[source]
        fault: StageFault,
    },

    /// Reading or writing a durable record failed mid-run.
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),

    /// An internal invariant of the job record or shared context broke.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<JobStateError> for OrchestrationError {
    fn from(err: JobStateError) -> Self {
        Self::Invariant(err.to_string())
    }
}

impl From<ContextError> for OrchestrationError {
    fn from(err: ContextError) -> Self {
        Self::Invariant(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_cause_names_stage_and_duration() {
        let fault = StageFault::TimedOut {
            stage: Stage::Analysis,
            after: Duration::from_secs(30),
        };
        assert_eq!(fault.to_string(), "stage 'analysis' timed out after 30s");
    }

    #[test]
    fn not_found_display_is_descriptive() {
        let err = StoreError::NotFound {
            kind: RecordKind::Job,
            id: ReportId::new(7),
        };
        assert_eq!(err.to_string(), "job record 7 not found");
    }
}
