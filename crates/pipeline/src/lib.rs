//! Core orchestration domain for Tickerscope.
//!
//! This crate contains every domain concept shared by the workspace: the job
//! record state machine, the shared context passed between stages, newtype
//! identifiers, the error taxonomy, and the port traits infrastructure crates
//! implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ReportId`, `RunId`, `Ticker`, `DocumentRef`) |
//! | [`types`] | Value types (`Progress`, `Timestamp`) |
//! | [`errors`] | Error taxonomy (stores, stage faults, sinks, orchestration) |
//! | [`job`] | Job record lifecycle and observable status |
//! | [`report`] | Parent report entity and status mirroring |
//! | [`stage`] | Stages, tagged stage outcomes, `StageProvider` port |
//! | [`context`] | Append-only shared context |
//! | [`progress`] | Progress checkpoint plan |
//! | [`ports`] | `JobStore`, `ReportStore`, `ResultSink` ports |
//! | [`status`] | Client-facing analysis status and report listings |

pub mod context;
pub mod errors;
pub mod identifiers;
pub mod job;
pub mod ports;
pub mod progress;
pub mod report;
pub mod stage;
pub mod status;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use context::{SharedContext, StageEntry};
pub use errors::{
    ContextError, JobStateError, OrchestrationError, RecordKind, SinkError, StageFault, StoreError,
};
pub use identifiers::{DocumentRef, ReportId, RunId, Ticker, MAX_TICKER_LEN};
pub use job::{can_transition, JobRecord, JobStatus, JobStatusView};
pub use ports::{JobStore, ReportStore, ResultSink};
pub use progress::{ProgressPlan, ProgressPlanError, StageWindow};
pub use report::{Report, ReportStatus};
pub use stage::{Stage, StageOutcome, StageProvider};
pub use status::{AnalysisStatus, ReportSummary};
pub use types::{Progress, Timestamp};
