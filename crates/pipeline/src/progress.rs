//! Progress checkpoints.
//!
//! The orchestrator does not derive progress from sub-task counts; it moves the
//! job record between fixed checkpoints. A [`ProgressPlan`] names them: one
//! value when the run starts, a start/end pair per stage, and one value once
//! all stages have run and the result is being finalised.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Progress, Stage};

/// Start and end checkpoint of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageWindow {
    /// Checkpoint written when the stage is entered.
    pub start: Progress,
    /// Checkpoint written once the stage's outcome is recorded.
    pub end: Progress,
}

/// A plan whose checkpoints are not strictly ordered.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("progress checkpoints must increase: {before} is followed by {after}")]
pub struct ProgressPlanError {
    /// The earlier checkpoint.
    pub before: f64,
    /// The later checkpoint that is not greater.
    pub after: f64,
}

/// The checkpoints a run moves through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPlan {
    started: Progress,
    stages: [StageWindow; 3],
    finalizing: Progress,
}

impl ProgressPlan {
    /// Creates a plan, validating that every checkpoint is strictly greater
    /// than the one before it (the run start may be `0.0`) and below `1.0`.
    pub fn new(
        started: Progress,
        stages: [StageWindow; 3],
        finalizing: Progress,
    ) -> Result<Self, ProgressPlanError> {
        let mut sequence = vec![started];
        for window in &stages {
            sequence.push(window.start);
            sequence.push(window.end);
        }
        sequence.push(finalizing);
        sequence.push(Progress::COMPLETE);

        for pair in sequence.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ProgressPlanError {
                    before: pair[0].as_f64(),
                    after: pair[1].as_f64(),
                });
            }
        }
        Ok(Self {
            started,
            stages,
            finalizing,
        })
    }

    /// Checkpoint written when the run starts.
    pub fn started(&self) -> Progress {
        self.started
    }

    /// Checkpoints of `stage`.
    pub fn window(&self, stage: Stage) -> StageWindow {
        self.stages[stage.position()]
    }

    /// Checkpoint written after the last stage, before the result sink runs.
    pub fn finalizing(&self) -> Progress {
        self.finalizing
    }
}

const DEFAULT_STAGES: [StageWindow; 3] = [
    StageWindow {
        start: Progress::checkpoint(0.1),
        end: Progress::checkpoint(0.4),
    },
    StageWindow {
        start: Progress::checkpoint(0.5),
        end: Progress::checkpoint(0.7),
    },
    StageWindow {
        start: Progress::checkpoint(0.8),
        end: Progress::checkpoint(0.9),
    },
];

const DEFAULT_FINALIZING: Progress = Progress::checkpoint(0.95);

impl Default for ProgressPlan {
    /// research 0.1 → 0.4, analysis 0.5 → 0.7, synthesis 0.8 → 0.9, then 0.95
    /// while the result is finalised.
    fn default() -> Self {
        Self {
            started: Progress::ZERO,
            stages: DEFAULT_STAGES,
            finalizing: DEFAULT_FINALIZING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(v: f64) -> Progress {
        Progress::new(v).unwrap()
    }

    #[test]
    fn default_plan_is_valid() {
        let plan = ProgressPlan::default();
        let rebuilt = ProgressPlan::new(
            plan.started(),
            [
                plan.window(Stage::Research),
                plan.window(Stage::Analysis),
                plan.window(Stage::Synthesis),
            ],
            plan.finalizing(),
        );
        assert_eq!(rebuilt, Ok(plan));
    }

    #[test]
    fn default_checkpoints_are_valid_fractions() {
        let mut values = vec![DEFAULT_FINALIZING.as_f64()];
        for window in DEFAULT_STAGES {
            values.push(window.start.as_f64());
            values.push(window.end.as_f64());
        }
        for value in values {
            assert_eq!(Progress::new(value).map(Progress::as_f64), Some(value));
        }
        assert_eq!(
            ProgressPlan::default().window(Stage::Analysis),
            StageWindow {
                start: p(0.5),
                end: p(0.7)
            }
        );
    }

    #[test]
    fn overlapping_windows_are_rejected() {
        let err = ProgressPlan::new(
            Progress::ZERO,
            [
                StageWindow {
                    start: p(0.1),
                    end: p(0.5),
                },
                StageWindow {
                    start: p(0.4),
                    end: p(0.7),
                },
                StageWindow {
                    start: p(0.8),
                    end: p(0.9),
                },
            ],
            p(0.95),
        )
        .unwrap_err();
        assert_eq!(err.before, 0.5);
        assert_eq!(err.after, 0.4);
    }

    #[test]
    fn finalizing_must_stay_below_complete() {
        let plan = ProgressPlan::default();
        let result = ProgressPlan::new(
            plan.started(),
            [
                plan.window(Stage::Research),
                plan.window(Stage::Analysis),
                plan.window(Stage::Synthesis),
            ],
            Progress::COMPLETE,
        );
        assert!(result.is_err());
    }
}
