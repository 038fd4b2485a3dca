//! Tickerscope orchestration layer.
//!
//! This crate drives analysis runs: the [`Orchestrator`] sequences the stage
//! providers over a growing shared context and keeps the job record and report
//! current; the [`dispatch`] module schedules runs on a worker pool; and
//! [`AnalysisService`] is the intake and status entry point used by front ends.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Sequences calls between the domain rules of the
//! [`pipeline`] crate and the infrastructure behind its port traits (stores,
//! stage providers, result sink). It contains no storage or transport code.
//!
//! ## Failure semantics
//!
//! | Failure | Channel | Effect |
//! |---------|---------|--------|
//! | Stage cannot produce its insight | `StageOutcome::Error` | recorded, run continues |
//! | Provider transport/infrastructure fault | `StageFault` | run aborts, job `failed` |
//! | Stage exceeds its timeout | `StageFault::TimedOut` | run aborts, job `failed` |
//! | Store write fails mid-run | `StoreError` | run aborts, job `failed` (best effort) |
//! | Result sink fails | `SinkError` | logged, job still `completed` |
//! | Job or report missing | `ContractViolation` | nothing written |

pub mod dispatch;
pub mod intake;
pub mod runner;
pub mod stages;

pub use dispatch::{
    spawn_workers, DispatchError, JobQueue, JobRequest, JobTicket, WorkerPool, WorkerPoolConfig,
};
pub use intake::{
    analysis_status, AnalysisService, IntakeError, Submission, RECENT_REPORTS_LIMIT,
};
pub use runner::{
    Orchestrator, OrchestratorConfig, RunOutcome, RunSummary, DEFAULT_STAGE_TIMEOUT,
};
pub use stages::{StagePipeline, StagePipelineError};
