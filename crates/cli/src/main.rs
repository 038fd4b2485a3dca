//! Tickerscope CLI entry point.
//!
//! This binary is the composition root for the whole system:
//!
//! 1. **Parse configuration**: load the TOML file given by `--config` (or the
//!    defaults) and validate it.
//! 2. **Wire observability**: install the `tracing-subscriber` stack and, when
//!    an OTLP endpoint is configured, the OpenTelemetry exporter.
//! 3. **Construct infrastructure**: stores, the Markdown result sink and one
//!    HTTP stage provider per stage, injected into the [`Orchestrator`].
//! 4. **Run the command**: `analyze <TICKER>` submits one analysis to the
//!    worker pool and waits for it; `status <ID>` prints a stored status;
//!    `reports` lists recent analyses and `show <ID>` prints one in full.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::{
    analysis_status, spawn_workers, AnalysisService, Orchestrator, StagePipeline,
    RECENT_REPORTS_LIMIT,
};
use pipeline::{JobStore, ReportId, ReportStore, StageProvider};
use providers::{HttpStageProvider, InsightClient};
use store::{InMemoryStore, MarkdownReportSink, SqliteStore};
use tracing::{info, warn};

use crate::config::{Config, ProvidersConfig, StorageBackend, StorageConfig};

/// Multi-stage equity analysis runner.
#[derive(Parser, Debug)]
#[command(name = "tickerscope")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run research, analysis and synthesis stages for a ticker", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(global = true, long = "config", short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a ticker and wait for the run to finish
    Analyze {
        /// Ticker symbol, e.g. ACME or BRK.B
        #[arg(value_name = "TICKER")]
        ticker: String,
    },

    /// Print the status of a stored analysis
    Status {
        /// Report identifier printed by `analyze`
        #[arg(value_name = "ID")]
        id: u64,
    },

    /// List the most recent analyses, newest first
    Reports {
        /// Maximum number of analyses to list
        #[arg(long, default_value_t = RECENT_REPORTS_LIMIT)]
        limit: usize,
    },

    /// Print a stored analysis with its stage outputs and document path
    Show {
        /// Report identifier printed by `analyze`
        #[arg(value_name = "ID")]
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let telemetry = telemetry::init(&config.logging)?;

    let result = match cli.command {
        Command::Analyze { ticker } => analyze(&config, &ticker).await,
        Command::Status { id } => status(&config, ReportId::new(id)).await,
        Command::Reports { limit } => reports(&config, limit).await,
        Command::Show { id } => show(&config, ReportId::new(id)).await,
    };

    telemetry.shutdown();
    result
}

async fn analyze(config: &Config, ticker: &str) -> Result<()> {
    let (jobs, reports) = open_stores(&config.storage)?;
    let stages = build_stages(&config.providers)?;
    let sink = Arc::new(MarkdownReportSink::new(&config.storage.reports_dir));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&jobs),
        Arc::clone(&reports),
        stages,
        sink,
        config.orchestrator(),
    ));

    let (queue, pool) = spawn_workers(orchestrator, config.pool());
    let service = AnalysisService::new(Arc::clone(&jobs), Arc::clone(&reports), queue.clone());
    let submission = service.create_analysis(ticker).await;
    drop(service);

    let submission = match submission {
        Ok(submission) => submission,
        Err(err) => {
            pool.shutdown(queue).await;
            return Err(err).context("analysis could not be submitted");
        }
    };
    let id = submission.report.id;
    info!(report_id = %id, ticker = %submission.report.ticker, "Waiting for analysis");
    let outcome = submission.ticket.wait().await;
    pool.shutdown(queue).await;

    let current = analysis_status(jobs.as_ref(), reports.as_ref(), id).await?;
    println!("{}", serde_json::to_string_pretty(&current)?);

    let summary = outcome?.with_context(|| format!("analysis {id} failed"))?;
    if let Some(err) = &summary.sink_error {
        warn!(report_id = %id, error = %err, "Analysis completed without a document");
    }
    Ok(())
}

async fn status(config: &Config, id: ReportId) -> Result<()> {
    let (jobs, reports) = open_persisted_stores(&config.storage)?;
    let current = analysis_status(jobs.as_ref(), reports.as_ref(), id)
        .await
        .with_context(|| format!("could not read analysis {id}"))?;
    println!("{}", serde_json::to_string_pretty(&current)?);
    Ok(())
}

async fn reports(config: &Config, limit: usize) -> Result<()> {
    let (_, reports) = open_persisted_stores(&config.storage)?;
    let listed = reports
        .list_reports(limit)
        .await
        .context("could not list analyses")?;
    println!("{}", serde_json::to_string_pretty(&listed)?);
    Ok(())
}

async fn show(config: &Config, id: ReportId) -> Result<()> {
    let (_, reports) = open_persisted_stores(&config.storage)?;
    let report = reports
        .load_report(id)
        .await
        .with_context(|| format!("could not read analysis {id}"))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Opens the stores for a read-only command.
fn open_persisted_stores(
    config: &StorageConfig,
) -> Result<(Arc<dyn JobStore>, Arc<dyn ReportStore>)> {
    if config.backend == StorageBackend::Memory {
        warn!("The in-memory backend keeps no state between invocations");
    }
    open_stores(config)
}

fn open_stores(config: &StorageConfig) -> Result<(Arc<dyn JobStore>, Arc<dyn ReportStore>)> {
    match config.backend {
        StorageBackend::Sqlite => {
            let store = SqliteStore::open(&config.path)
                .with_context(|| format!("could not open {}", config.path.display()))?;
            Ok(split(Arc::new(store)))
        }
        StorageBackend::Memory => Ok(split(Arc::new(InMemoryStore::new()))),
    }
}

fn split<S>(store: Arc<S>) -> (Arc<dyn JobStore>, Arc<dyn ReportStore>)
where
    S: JobStore + ReportStore + 'static,
{
    let jobs: Arc<dyn JobStore> = store.clone();
    let reports: Arc<dyn ReportStore> = store;
    (jobs, reports)
}

fn build_stages(config: &ProvidersConfig) -> Result<StagePipeline> {
    let client = InsightClient::new(config.request_timeout())?;
    let providers = config
        .endpoints()?
        .into_iter()
        .map(|(stage, endpoint)| {
            Arc::new(HttpStageProvider::new(stage, endpoint, client.clone()))
                as Arc<dyn StageProvider>
        })
        .collect();
    Ok(StagePipeline::new(providers)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_analyze_with_global_config() {
        let cli = Cli::try_parse_from(["tickerscope", "analyze", "acme", "--config", "t.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("t.toml")));
        assert!(matches!(cli.command, Command::Analyze { ticker } if ticker == "acme"));
    }

    #[test]
    fn status_requires_numeric_id() {
        assert!(Cli::try_parse_from(["tickerscope", "status", "abc"]).is_err());
        let cli = Cli::try_parse_from(["tickerscope", "status", "12"]).unwrap();
        assert!(matches!(cli.command, Command::Status { id: 12 }));
    }

    #[test]
    fn reports_defaults_to_recent_limit() {
        let cli = Cli::try_parse_from(["tickerscope", "reports"]).unwrap();
        assert!(matches!(cli.command, Command::Reports { limit } if limit == RECENT_REPORTS_LIMIT));
        let cli = Cli::try_parse_from(["tickerscope", "reports", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Command::Reports { limit: 5 }));
    }

    #[test]
    fn show_takes_a_report_id() {
        let cli = Cli::try_parse_from(["tickerscope", "show", "7"]).unwrap();
        assert!(matches!(cli.command, Command::Show { id: 7 }));
        assert!(Cli::try_parse_from(["tickerscope", "show"]).is_err());
    }

    #[tokio::test]
    async fn stored_reports_are_listed_and_shown() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: dir.path().join("tickerscope.db"),
            ..StorageConfig::default()
        };
        let (_, reports) = open_stores(&config).unwrap();
        let ticker = pipeline::Ticker::parse("ACME").unwrap();
        let created = reports.create_report(&ticker).await.unwrap();

        let (_, reopened) = open_persisted_stores(&config).unwrap();
        let listed = reopened.list_reports(RECENT_REPORTS_LIMIT).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(reopened.load_report(created.id).await.unwrap(), created);
    }

    #[test]
    fn stages_are_built_in_order_from_endpoints() {
        let config = ProvidersConfig {
            research_url: Some("http://localhost:8081/research".to_string()),
            analysis_url: Some("http://localhost:8082/analysis".to_string()),
            synthesis_url: Some("http://localhost:8083/synthesis".to_string()),
            ..ProvidersConfig::default()
        };
        let stages = build_stages(&config).unwrap();
        let order: Vec<_> = stages.iter().map(|(stage, _)| stage).collect();
        assert_eq!(order, pipeline::Stage::ALL.to_vec());
    }

    #[tokio::test]
    async fn memory_stores_share_state() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        };
        let (jobs, reports) = open_stores(&config).unwrap();
        let ticker = pipeline::Ticker::parse("ACME").unwrap();
        let report = reports.create_report(&ticker).await.unwrap();
        jobs.save_job(&pipeline::JobRecord::queued(report.id))
            .await
            .unwrap();
        assert!(analysis_status(jobs.as_ref(), reports.as_ref(), report.id)
            .await
            .is_ok());
    }
}
