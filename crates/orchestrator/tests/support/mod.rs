//! Test doubles shared by the orchestrator integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orchestrator::{Orchestrator, OrchestratorConfig, StagePipeline};
use pipeline::{
    DocumentRef, JobRecord, JobStore, Report, ReportId, ReportStatus, ReportStore, ReportSummary,
    ResultSink, SharedContext, SinkError, Stage, StageFault, StageOutcome, StageProvider,
    StoreError, Ticker,
};
use serde_json::{json, Map, Value};
use store::InMemoryStore;

pub fn ticker(raw: &str) -> Ticker {
    Ticker::parse(raw).unwrap()
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A representative payload for each stage.
pub fn sample_payload(stage: Stage) -> Map<String, Value> {
    match stage {
        Stage::Research => object(json!({
            "news": {"articles": [{"title": "a"}, {"title": "b"}]},
            "sentiment": {"sentiment_label": "bullish", "sentiment_score": 0.3}
        })),
        Stage::Analysis => object(json!({
            "price": {"current_price": 101.5},
            "kpis": {"pe_ratio": 18.2, "roi_1y": 12.0, "volatility": 0.2}
        })),
        Stage::Synthesis => object(json!({
            "report": {"full_text": "Acme looks healthy."}
        })),
    }
}

// ---------------------------------------------------------------------------
// Stage providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Behaviour {
    Complete(Map<String, Value>),
    SoftFail(String),
    Fault(StageFault),
    Stall(Duration),
    Panic,
}

/// Provider that answers with a scripted behaviour and records every context
/// it was handed.
pub struct ScriptedProvider {
    stage: Stage,
    behaviour: Behaviour,
    seen: Mutex<Vec<SharedContext>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(stage: Stage, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            stage,
            behaviour,
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn completing(stage: Stage) -> Arc<Self> {
        Self::new(stage, Behaviour::Complete(sample_payload(stage)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SharedContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageProvider for ScriptedProvider {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn analyze(
        &self,
        _subject: &Ticker,
        context: &SharedContext,
    ) -> Result<StageOutcome, StageFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(context.clone());
        match &self.behaviour {
            Behaviour::Complete(payload) => Ok(StageOutcome::completed(payload.clone())),
            Behaviour::SoftFail(cause) => Ok(StageOutcome::error(cause.clone())),
            Behaviour::Fault(fault) => Err(fault.clone()),
            Behaviour::Stall(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(StageOutcome::completed(Map::new()))
            }
            Behaviour::Panic => panic!("{} provider exploded", self.stage),
        }
    }
}

/// The three scripted providers of one run.
pub struct Providers {
    pub research: Arc<ScriptedProvider>,
    pub analysis: Arc<ScriptedProvider>,
    pub synthesis: Arc<ScriptedProvider>,
}

impl Providers {
    pub fn completing() -> Self {
        Self {
            research: ScriptedProvider::completing(Stage::Research),
            analysis: ScriptedProvider::completing(Stage::Analysis),
            synthesis: ScriptedProvider::completing(Stage::Synthesis),
        }
    }

    pub fn with(mut self, stage: Stage, behaviour: Behaviour) -> Self {
        let provider = ScriptedProvider::new(stage, behaviour);
        match stage {
            Stage::Research => self.research = provider,
            Stage::Analysis => self.analysis = provider,
            Stage::Synthesis => self.synthesis = provider,
        }
        self
    }

    pub fn pipeline(&self) -> StagePipeline {
        StagePipeline::new(vec![
            self.research.clone() as Arc<dyn StageProvider>,
            self.analysis.clone(),
            self.synthesis.clone(),
        ])
        .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

type JobPredicate = Box<dyn Fn(&JobRecord) -> bool + Send + Sync>;
type ReportPredicate = Box<dyn Fn(&Report) -> bool + Send + Sync>;

/// In-memory store that records every save and can be told to reject some.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    job_saves: Mutex<Vec<JobRecord>>,
    report_saves: Mutex<Vec<Report>>,
    reject_job: Mutex<Option<JobPredicate>>,
    reject_report: Mutex<Option<ReportPredicate>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `save_job` fail for every record matching `predicate`.
    pub fn reject_job_saves(&self, predicate: impl Fn(&JobRecord) -> bool + Send + Sync + 'static) {
        *self.reject_job.lock().unwrap() = Some(Box::new(predicate));
    }

    /// Makes `save_report` fail for every report matching `predicate`.
    pub fn reject_report_saves(
        &self,
        predicate: impl Fn(&Report) -> bool + Send + Sync + 'static,
    ) {
        *self.reject_report.lock().unwrap() = Some(Box::new(predicate));
    }

    /// Statuses of every accepted report save, in order.
    pub fn report_statuses(&self) -> Vec<ReportStatus> {
        self.report_saves().iter().map(|report| report.status).collect()
    }

    pub fn job_saves(&self) -> Vec<JobRecord> {
        self.job_saves.lock().unwrap().clone()
    }

    pub fn report_saves(&self) -> Vec<Report> {
        self.report_saves.lock().unwrap().clone()
    }

    pub fn clear_history(&self) {
        self.job_saves.lock().unwrap().clear();
        self.report_saves.lock().unwrap().clear();
    }

    /// Creates a pending report and its queued job, as intake does.
    pub async fn seed(&self, subject: &str) -> ReportId {
        let report = self.inner.create_report(&ticker(subject)).await.unwrap();
        self.inner
            .save_job(&JobRecord::queued(report.id))
            .await
            .unwrap();
        report.id
    }

    pub async fn job(&self, id: ReportId) -> JobRecord {
        self.inner.load_job(id).await.unwrap()
    }

    pub async fn report(&self, id: ReportId) -> Report {
        self.inner.load_report(id).await.unwrap()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn load_job(&self, id: ReportId) -> Result<JobRecord, StoreError> {
        self.inner.load_job(id).await
    }

    async fn save_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let rejected = self
            .reject_job
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|predicate| predicate(job));
        if rejected {
            return Err(StoreError::unavailable("disk full"));
        }
        self.job_saves.lock().unwrap().push(job.clone());
        self.inner.save_job(job).await
    }
}

#[async_trait]
impl ReportStore for RecordingStore {
    async fn create_report(&self, ticker: &Ticker) -> Result<Report, StoreError> {
        self.inner.create_report(ticker).await
    }

    async fn load_report(&self, id: ReportId) -> Result<Report, StoreError> {
        self.inner.load_report(id).await
    }

    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let rejected = self
            .reject_report
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|predicate| predicate(report));
        if rejected {
            return Err(StoreError::unavailable("disk full"));
        }
        self.report_saves.lock().unwrap().push(report.clone());
        self.inner.save_report(report).await
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<ReportSummary>, StoreError> {
        self.inner.list_reports(limit).await
    }
}

// ---------------------------------------------------------------------------
// Result sinks
// ---------------------------------------------------------------------------

/// Sink that records what it was handed and returns a fixed document.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<SharedContext>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn received(&self) -> Vec<SharedContext> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn persist(
        &self,
        subject: &Ticker,
        context: &SharedContext,
    ) -> Result<Option<DocumentRef>, SinkError> {
        self.received.lock().unwrap().push(context.clone());
        Ok(DocumentRef::new(format!(
            "reports/report_{subject}_{}.md",
            context.report_id()
        )))
    }
}

/// Sink that always fails.
pub struct FailingSink;

#[async_trait]
impl ResultSink for FailingSink {
    async fn persist(
        &self,
        _subject: &Ticker,
        _context: &SharedContext,
    ) -> Result<Option<DocumentRef>, SinkError> {
        Err(SinkError::Render("template missing".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        stage_timeout: Some(Duration::from_secs(5)),
        ..OrchestratorConfig::default()
    }
}

pub fn build_orchestrator(
    store: &Arc<RecordingStore>,
    providers: &Providers,
    sink: Arc<dyn ResultSink>,
    config: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::new(
        store.clone(),
        store.clone(),
        providers.pipeline(),
        sink,
        config,
    )
}
