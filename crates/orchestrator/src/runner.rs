//! The orchestration run loop.
//!
//! [`Orchestrator::run`] drives one analysis from `queued` to a terminal state:
//!
//! 1. Load the job record and report; missing records are a caller bug and
//!    nothing is written.
//! 2. Mark both as running/processing and checkpoint the start.
//! 3. Invoke each stage provider in order with the subject and the shared
//!    context accumulated so far. Soft failures are recorded and the run goes
//!    on; hard faults abort the run.
//! 4. Persist the artifact, run the result sink (its failure only degrades the
//!    result), and mark both records completed.
//!
//! Every checkpoint is persisted before the next stage starts, so a polling
//! reader sees progress advance in stage order.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    DocumentRef, JobRecord, JobStore, OrchestrationError, ProgressPlan, Report, ReportId,
    ReportStore, ResultSink, RunId, SharedContext, Stage, StageFault, StageOutcome,
    StageProvider, StoreError, Ticker,
};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use crate::StagePipeline;

/// Default per-stage timeout.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of one [`Orchestrator::run`] call.
pub type RunOutcome = Result<RunSummary, OrchestrationError>;

/// Tunables of the run loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Progress checkpoints written during a run.
    pub plan: ProgressPlan,
    /// Maximum time one stage invocation may take. `None` waits forever.
    ///
    /// An elapsed timeout is a hard failure, so a stalled provider still
    /// leaves the job in `failed` rather than stuck in `running`.
    pub stage_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            plan: ProgressPlan::default(),
            stage_timeout: Some(DEFAULT_STAGE_TIMEOUT),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Identity of the run.
    pub run_id: RunId,
    /// Identity of the job/report.
    pub report_id: ReportId,
    /// The analysed subject.
    pub subject: Ticker,
    /// Stages that failed softly, in execution order.
    pub degraded_stages: Vec<Stage>,
    /// Document produced by the result sink.
    pub document: Option<DocumentRef>,
    /// Why the result sink failed, when it did.
    pub sink_error: Option<String>,
}

/// Drives analysis runs over a fixed stage pipeline.
///
/// Constructed once at start-up with every collaborator injected and shared
/// by reference across runs; holds no per-run state.
pub struct Orchestrator {
    jobs: Arc<dyn JobStore>,
    reports: Arc<dyn ReportStore>,
    stages: StagePipeline,
    sink: Arc<dyn ResultSink>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        reports: Arc<dyn ReportStore>,
        stages: StagePipeline,
        sink: Arc<dyn ResultSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            jobs,
            reports,
            stages,
            sink,
            config,
        }
    }

    /// Runs the analysis of `subject` for the job identified by `report_id`.
    ///
    /// Callers must invoke this at most once per job. A job that is not
    /// `queued` is rejected with [`OrchestrationError::NotRunnable`] and left
    /// untouched.
    pub async fn run(&self, subject: &Ticker, report_id: ReportId) -> RunOutcome {
        let run_id = RunId::new_random();
        let span = info_span!("analysis_run", %run_id, %report_id, subject = %subject);
        self.drive(subject, report_id, run_id).instrument(span).await
    }

    /// Marks a job whose run ended without reaching a terminal state (e.g. the
    /// run task panicked) as failed with `cause`.
    ///
    /// Jobs that are already terminal are left untouched. Errors are logged.
    pub async fn mark_abandoned(&self, report_id: ReportId, cause: &str) {
        let (mut job, mut report) = match self.load(report_id).await {
            Ok(records) => records,
            Err(err) => {
                error!(%report_id, error = %err, "Could not load abandoned job");
                return;
            }
        };
        if job.status().is_terminal() {
            return;
        }
        self.abort(
            &mut job,
            &mut report,
            OrchestrationError::Invariant(cause.to_string()),
        )
        .await;
    }

    async fn drive(&self, subject: &Ticker, report_id: ReportId, run_id: RunId) -> RunOutcome {
        let (mut job, mut report) = self.load(report_id).await?;
        if report.ticker != *subject {
            warn!(
                stored = %report.ticker,
                "Report was created for a different ticker; analysing the requested subject"
            );
        }

        job.start()
            .map_err(|source| OrchestrationError::NotRunnable {
                id: report_id,
                source,
            })?;

        let mut context = SharedContext::new(subject.clone(), report_id, run_id);
        match self.execute(&mut job, &mut report, &mut context).await {
            Ok(summary) => Ok(summary),
            Err(err) => Err(self.abort(&mut job, &mut report, err).await),
        }
    }

    async fn load(&self, id: ReportId) -> Result<(JobRecord, Report), OrchestrationError> {
        let job = self.jobs.load_job(id).await.map_err(load_error)?;
        let report = self.reports.load_report(id).await.map_err(load_error)?;
        Ok((job, report))
    }

    async fn execute(
        &self,
        job: &mut JobRecord,
        report: &mut Report,
        context: &mut SharedContext,
    ) -> RunOutcome {
        let plan = &self.config.plan;
        let subject = context.subject().clone();

        job.checkpoint(plan.started(), format!("Analysis started for {subject}"))?;
        report.mirror(job.status());
        self.save_report(report).await?;
        self.save_job(job).await?;
        info!("Analysis run started");

        for (stage, provider) in self.stages.iter() {
            let window = plan.window(stage);
            job.enter_stage(stage, window.start)?;
            self.save_job(job).await?;

            let outcome = self
                .invoke(stage, provider.as_ref(), &subject, context)
                .instrument(info_span!("stage", stage = %stage))
                .await
                .map_err(|fault| OrchestrationError::Stage { stage, fault })?;

            match outcome.cause() {
                Some(cause) => warn!(
                    stage = %stage,
                    cause,
                    "Stage failed softly; continuing with degraded context"
                ),
                None => info!(stage = %stage, "Stage completed"),
            }

            let digest = stage.digest(&outcome);
            context.record(stage, outcome)?;
            job.checkpoint(window.end, digest)?;
            self.save_job(job).await?;
        }

        let artifact = context.to_artifact().map_err(|err| {
            OrchestrationError::Invariant(format!("artifact serialisation failed: {err}"))
        })?;
        report.artifact = Some(artifact);
        job.checkpoint(plan.finalizing(), "Finalizing report")?;
        self.save_report(report).await?;
        self.save_job(job).await?;

        let (document, sink_error) = match self.sink.persist(&subject, context).await {
            Ok(document) => (document, None),
            Err(err) => {
                warn!(error = %err, "Result sink failed; completing without a document");
                (None, Some(err.to_string()))
            }
        };

        let degraded_stages = context.degraded_stages();
        let summary_line = if degraded_stages.is_empty() {
            "Analysis completed successfully".to_string()
        } else {
            let names: Vec<&str> = degraded_stages.iter().map(|s| s.as_str()).collect();
            format!(
                "Analysis completed with degraded stages: {}",
                names.join(", ")
            )
        };

        // The job is completed on a copy so a failed save leaves the in-memory
        // job running and the abort path can still mark it failed. The report
        // follows the durable job, never the other way round.
        let mut finished_job = job.clone();
        finished_job.complete(summary_line)?;
        self.save_job(&finished_job).await?;
        *job = finished_job;
        report.document = document.clone();
        report.mirror(job.status());
        self.save_report(report).await?;

        info!(
            degraded = degraded_stages.len(),
            document = document.as_ref().map(DocumentRef::as_str),
            "Analysis run completed"
        );

        Ok(RunSummary {
            run_id: context.run_id(),
            report_id: context.report_id(),
            subject,
            degraded_stages,
            document,
            sink_error,
        })
    }

    async fn invoke(
        &self,
        stage: Stage,
        provider: &dyn StageProvider,
        subject: &Ticker,
        context: &SharedContext,
    ) -> Result<StageOutcome, StageFault> {
        info!(provider = stage.display_name(), "Invoking stage provider");
        let call = provider.analyze(subject, context);
        let result = match self.config.stage_timeout {
            Some(after) => match tokio::time::timeout(after, call).await {
                Ok(result) => result,
                Err(_) => Err(StageFault::TimedOut { stage, after }),
            },
            None => call.await,
        };
        result.map(StageOutcome::normalized)
    }

    /// Marks the job and report failed with `err` as the cause.
    ///
    /// Writes are best effort: when the store itself is the cause they will
    /// likely fail too, which is logged. A job that already reached a terminal
    /// state keeps it; only its report is brought in line.
    async fn abort(
        &self,
        job: &mut JobRecord,
        report: &mut Report,
        err: OrchestrationError,
    ) -> OrchestrationError {
        let cause = err.to_string();
        error!(error = %cause, "Analysis run aborted");

        if !job.status().is_terminal() {
            if let Err(state_err) = job.fail(cause) {
                error!(error = %state_err, "Job record could not be marked failed");
                return err;
            }
            if let Err(store_err) = self.jobs.save_job(job).await {
                error!(error = %store_err, "Could not persist failed job status");
            }
        }

        report.mirror(job.status());
        if let Err(store_err) = self.reports.save_report(report).await {
            error!(
                status = %report.status,
                error = %store_err,
                "Could not persist terminal report status"
            );
        }
        err
    }

    async fn save_job(&self, job: &JobRecord) -> Result<(), OrchestrationError> {
        self.jobs
            .save_job(job)
            .await
            .map_err(OrchestrationError::Storage)
    }

    async fn save_report(&self, report: &Report) -> Result<(), OrchestrationError> {
        self.reports
            .save_report(report)
            .await
            .map_err(OrchestrationError::Storage)
    }
}

fn load_error(err: StoreError) -> OrchestrationError {
    match err {
        StoreError::NotFound { .. } => OrchestrationError::ContractViolation(err),
        other => OrchestrationError::Storage(other),
    }
}
