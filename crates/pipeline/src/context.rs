//! The shared context accumulated across stages.
//!
//! One [`SharedContext`] exists per run and is owned by the orchestrator.
//! Providers only ever see `&SharedContext`, so the borrow checker guarantees
//! they cannot alter entries written by earlier stages; appending requires
//! `&mut` and therefore the orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ContextError, ReportId, RunId, Stage, StageOutcome, Ticker};

/// One recorded stage outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    /// The stage that produced the outcome.
    pub stage: Stage,
    /// What it produced.
    pub outcome: StageOutcome,
}

/// Append-only accumulator of stage outcomes for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedContext {
    subject: Ticker,
    report_id: ReportId,
    run_id: RunId,
    stage_outputs: Vec<StageEntry>,
}

impl SharedContext {
    /// Creates an empty context for a run.
    pub fn new(subject: Ticker, report_id: ReportId, run_id: RunId) -> Self {
        Self {
            subject,
            report_id,
            run_id,
            stage_outputs: Vec::with_capacity(Stage::ALL.len()),
        }
    }

    /// The subject under analysis.
    pub fn subject(&self) -> &Ticker {
        &self.subject
    }

    /// Identity of the job/report the run belongs to.
    pub fn report_id(&self) -> ReportId {
        self.report_id
    }

    /// Identity of the run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The outcome recorded for `stage`, if it has run.
    pub fn get(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stage_outputs
            .iter()
            .find(|entry| entry.stage == stage)
            .map(|entry| &entry.outcome)
    }

    /// The payload of `stage` when it completed; `None` when it has not run
    /// or failed softly.
    pub fn payload(&self, stage: Stage) -> Option<&serde_json::Map<String, Value>> {
        self.get(stage).and_then(StageOutcome::payload)
    }

    /// All recorded entries in execution order.
    pub fn entries(&self) -> &[StageEntry] {
        &self.stage_outputs
    }

    /// Stages that recorded a soft failure, in execution order.
    pub fn degraded_stages(&self) -> Vec<Stage> {
        self.stage_outputs
            .iter()
            .filter(|entry| entry.outcome.is_error())
            .map(|entry| entry.stage)
            .collect()
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.stage_outputs.len()
    }

    /// Returns `true` before the first stage has been recorded.
    pub fn is_empty(&self) -> bool {
        self.stage_outputs.is_empty()
    }

    /// Appends `stage`'s outcome.
    ///
    /// Each stage may be recorded once, and only after every stage recorded so
    /// far, which keeps insertion order equal to execution order.
    pub fn record(&mut self, stage: Stage, outcome: StageOutcome) -> Result<(), ContextError> {
        if self.get(stage).is_some() {
            return Err(ContextError::DuplicateStage(stage));
        }
        if let Some(last) = self.stage_outputs.last() {
            if last.stage > stage {
                return Err(ContextError::OutOfOrder {
                    stage,
                    last: last.stage,
                });
            }
        }
        let outcome = outcome.normalized();
        tracing::debug!(
            run_id = %self.run_id,
            stage = %stage,
            degraded = outcome.is_error(),
            "Stage outcome recorded in shared context"
        );
        self.stage_outputs.push(StageEntry { stage, outcome });
        Ok(())
    }

    /// JSON artifact persisted on the report once all stages have run.
    pub fn to_artifact(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
