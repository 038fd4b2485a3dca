//! Pipeline stages and the stage provider port.
//!
//! A stage is one ordered step of the pipeline. Each stage delegates to a
//! [`StageProvider`], an external insight producer the orchestrator treats
//! uniformly regardless of what it computes.
//!
//! ## Failure channels
//!
//! Providers report two kinds of failure through two different channels:
//!
//! - **Soft failure** is data: `Ok(StageOutcome::Error { cause })`. The stage
//!   could not produce its insight (e.g. no articles were found). The outcome
//!   is stored in the shared context and the pipeline continues so later
//!   stages can degrade their own output.
//! - **Hard failure** is control flow: `Err(StageFault)`. Something below the
//!   stage broke (transport unreachable, backing store down). The run aborts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{SharedContext, StageFault, Ticker};

/// Cause recorded when a provider reports a soft failure without saying why.
const UNSPECIFIED_CAUSE: &str = "stage reported an error without a cause";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One step of the analysis pipeline.
///
/// The derive order of `PartialOrd`/`Ord` follows declaration order, which is
/// also execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Market research: news collection and sentiment.
    Research,
    /// Quantitative analysis: prices, history, KPIs.
    Analysis,
    /// Synthesis of the final report from the two earlier stages.
    Synthesis,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 3] = [Stage::Research, Stage::Analysis, Stage::Synthesis];

    /// Stable machine name used as the shared-context key and in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Analysis => "analysis",
            Stage::Synthesis => "synthesis",
        }
    }

    /// Parses a machine name produced by [`Stage::as_str`].
    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "research" => Some(Stage::Research),
            "analysis" => Some(Stage::Analysis),
            "synthesis" => Some(Stage::Synthesis),
            _ => None,
        }
    }

    /// Human-readable name of the insight provider behind the stage.
    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Research => "Market Researcher",
            Stage::Analysis => "Data Analyst",
            Stage::Synthesis => "Report Writer",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn position(self) -> usize {
        match self {
            Stage::Research => 0,
            Stage::Analysis => 1,
            Stage::Synthesis => 2,
        }
    }

    /// One-line, human-readable digest of what this stage produced.
    ///
    /// Used as the job record's `log_summary` after the stage's checkpoint.
    pub fn digest(self, outcome: &StageOutcome) -> String {
        let payload = match outcome {
            StageOutcome::Completed { payload } => payload,
            StageOutcome::Error { cause } => {
                return format!("{} degraded: {cause}", self.display_name());
            }
        };
        match self {
            Stage::Research => {
                let articles = payload
                    .get("news")
                    .and_then(|news| news.get("articles"))
                    .or_else(|| payload.get("articles"))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                format!("Market research completed: {articles} articles analyzed")
            }
            Stage::Analysis => {
                let kpis = payload
                    .get("kpis")
                    .and_then(Value::as_object)
                    .map_or(0, Map::len);
                format!("Financial analysis completed: {kpis} KPIs calculated")
            }
            Stage::Synthesis => {
                let chars = payload
                    .get("report")
                    .and_then(|report| report.get("full_text"))
                    .and_then(Value::as_str)
                    .map_or(0, |text| text.chars().count());
                format!("Report synthesis completed: {chars} characters")
            }
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stage outcome
// ---------------------------------------------------------------------------

/// Tagged result of one stage invocation.
///
/// Serialises as `{"status": "completed", "payload": {..}}` or
/// `{"status": "error", "cause": ".."}`, which is also the wire shape insight
/// services answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage produced its insight.
    Completed {
        /// Opaque stage output consumed by later stages and the result sink.
        payload: Map<String, Value>,
    },
    /// The stage could not produce its insight (soft failure).
    Error {
        /// Machine-readable cause; never empty.
        cause: String,
    },
}

impl StageOutcome {
    /// Creates a completed outcome.
    pub fn completed(payload: Map<String, Value>) -> Self {
        Self::Completed { payload }
    }

    /// Creates a soft-failure outcome.
    ///
    /// An empty or blank cause is replaced with a generic one so an `error`
    /// entry never carries an empty cause.
    pub fn error(cause: impl Into<String>) -> Self {
        let cause = cause.into();
        if cause.trim().is_empty() {
            Self::Error {
                cause: UNSPECIFIED_CAUSE.to_string(),
            }
        } else {
            Self::Error { cause }
        }
    }

    /// Returns `true` for a soft failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns the payload of a completed outcome.
    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Completed { payload } => Some(payload),
            Self::Error { .. } => None,
        }
    }

    /// Returns the cause of a soft failure.
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Error { cause } => Some(cause),
        }
    }

    /// Enforces the non-empty-cause invariant on outcomes that were
    /// deserialised or constructed directly.
    pub fn normalized(self) -> Self {
        match self {
            Self::Error { cause } => Self::error(cause),
            completed => completed,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider port
// ---------------------------------------------------------------------------

/// An external insight producer backing one pipeline stage.
///
/// Implementations receive the subject and a shared borrow of everything
/// earlier stages produced. They cannot mutate the context; the orchestrator
/// appends their outcome after they return.
///
/// Implementations must tolerate degraded upstream data: any earlier entry may
/// be an [`StageOutcome::Error`].
#[async_trait]
pub trait StageProvider: Send + Sync {
    /// The stage this provider serves.
    fn stage(&self) -> Stage;

    /// Produces the stage's outcome for `subject`.
    ///
    /// Expected failures are returned as `Ok(StageOutcome::Error { .. })`.
    /// `Err` is reserved for infrastructure faults and aborts the run.
    async fn analyze(
        &self,
        subject: &Ticker,
        context: &SharedContext,
    ) -> Result<StageOutcome, StageFault>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn stages_are_ordered_by_execution() {
        assert!(Stage::Research < Stage::Analysis);
        assert!(Stage::Analysis < Stage::Synthesis);
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.position(), i);
            assert_eq!(Stage::from_name(stage.as_str()), Some(*stage));
        }
    }

    #[test]
    fn error_outcome_never_has_empty_cause() {
        assert_eq!(StageOutcome::error("  ").cause(), Some(UNSPECIFIED_CAUSE));
        let decoded: StageOutcome =
            serde_json::from_value(json!({"status": "error", "cause": ""})).unwrap();
        assert_eq!(decoded.normalized().cause(), Some(UNSPECIFIED_CAUSE));
    }

    #[test]
    fn outcome_wire_shape_is_status_tagged() {
        let outcome = StageOutcome::completed(payload(json!({"summary": "ok"})));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"status": "completed", "payload": {"summary": "ok"}})
        );
        assert_eq!(
            serde_json::to_value(StageOutcome::error("no articles found")).unwrap(),
            json!({"status": "error", "cause": "no articles found"})
        );
    }

    #[test]
    fn digest_counts_stage_items() {
        let research = StageOutcome::completed(payload(json!({
            "news": {"articles": [{"title": "a"}, {"title": "b"}]}
        })));
        assert_eq!(
            Stage::Research.digest(&research),
            "Market research completed: 2 articles analyzed"
        );

        let analysis = StageOutcome::completed(payload(json!({
            "kpis": {"pe_ratio": 21.3, "beta": 1.1, "roi_1y": 12.0}
        })));
        assert_eq!(
            Stage::Analysis.digest(&analysis),
            "Financial analysis completed: 3 KPIs calculated"
        );

        let synthesis = StageOutcome::completed(payload(json!({
            "report": {"full_text": "HOLD."}
        })));
        assert_eq!(
            Stage::Synthesis.digest(&synthesis),
            "Report synthesis completed: 5 characters"
        );
    }

    #[test]
    fn digest_of_soft_failure_names_the_cause() {
        let outcome = StageOutcome::error("no articles found");
        assert_eq!(
            Stage::Research.digest(&outcome),
            "Market Researcher degraded: no articles found"
        );
    }
}
