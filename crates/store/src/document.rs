//! Markdown rendering of finished analyses.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{
    DocumentRef, ResultSink, SharedContext, SinkError, Stage, StageOutcome, Ticker, Timestamp,
};
use serde_json::{Map, Value};
use tracing::info;

/// [`ResultSink`] that writes one Markdown document per analysis.
///
/// Files are named `report_{TICKER}_{id}_{YYYYmmdd_HHMMSS}.md` and placed in
/// the configured directory, which is created on first use.
#[derive(Debug, Clone)]
pub struct MarkdownReportSink {
    dir: PathBuf,
}

impl MarkdownReportSink {
    /// Creates a sink writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the documents are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ResultSink for MarkdownReportSink {
    async fn persist(
        &self,
        subject: &Ticker,
        context: &SharedContext,
    ) -> Result<Option<DocumentRef>, SinkError> {
        let generated_at = Timestamp::now();
        let body = render_markdown(subject, context, generated_at)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = format!(
            "report_{}_{}_{}.md",
            subject,
            context.report_id(),
            generated_at.file_stamp()
        );
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, body).await?;

        let written = path.display().to_string();
        info!(path = %written, "Report document written");
        DocumentRef::new(written)
            .map(Some)
            .ok_or_else(|| SinkError::Render("document path is empty".to_string()))
    }
}

/// Renders the analysis of `subject` as a Markdown document.
///
/// Fails when the context holds no stage output at all.
pub fn render_markdown(
    subject: &Ticker,
    context: &SharedContext,
    generated_at: Timestamp,
) -> Result<String, SinkError> {
    if context.is_empty() {
        return Err(SinkError::Render(format!(
            "no stage output recorded for {subject}"
        )));
    }

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "# {subject} Stock Analysis\n");
    let _ = writeln!(
        out,
        "Generated: {}  \nReport: {}  \nRun: {}\n",
        generated_at.as_datetime().format("%Y-%m-%d %H:%M:%S UTC"),
        context.report_id(),
        context.run_id()
    );

    write_synthesis(&mut out, context.get(Stage::Synthesis));
    write_sentiment(&mut out, context.get(Stage::Research));
    write_financials(&mut out, context.get(Stage::Analysis));
    write_stage_table(&mut out, context);

    Ok(out)
}

fn write_synthesis(out: &mut String, outcome: Option<&StageOutcome>) {
    let _ = writeln!(out, "## Investment Analysis\n");
    let text = match outcome {
        Some(StageOutcome::Completed { payload }) => lookup(payload, &["report", "full_text"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "_No report text was produced._".to_string()),
        Some(StageOutcome::Error { cause }) => format!("_Unavailable: {cause}_"),
        None => "_Not run._".to_string(),
    };
    let _ = writeln!(out, "{}\n", text.trim_end());
}

fn write_sentiment(out: &mut String, outcome: Option<&StageOutcome>) {
    let Some(payload) = completed_payload(out, "Market Sentiment", outcome) else {
        return;
    };
    let label = lookup(payload, &["sentiment", "sentiment_label"])
        .and_then(Value::as_str)
        .unwrap_or("n/a")
        .to_uppercase();
    let _ = writeln!(out, "- **Sentiment:** {label}");
    let _ = writeln!(
        out,
        "- **Sentiment score:** {}",
        number(lookup(payload, &["sentiment", "sentiment_score"]), 4)
    );
    let _ = writeln!(
        out,
        "- **Articles analyzed:** {}",
        number(lookup(payload, &["sentiment", "analyzed_articles"]), 0)
    );
    if let Some(summary) = payload.get("summary").and_then(Value::as_str) {
        let _ = writeln!(out, "\n{}", summary.trim_end());
    }
    out.push('\n');
}

fn write_financials(out: &mut String, outcome: Option<&StageOutcome>) {
    let Some(payload) = completed_payload(out, "Financial Snapshot", outcome) else {
        return;
    };
    if let Some(name) = lookup(payload, &["company", "name"]).and_then(Value::as_str) {
        let _ = writeln!(out, "**Company:** {name}\n");
    }
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|--------|-------|");
    let rows: [(&str, &[&str], usize); 5] = [
        ("Current price", &["price", "current_price"], 2),
        ("P/E ratio", &["kpis", "pe_ratio"], 2),
        ("ROI (1Y, %)", &["kpis", "roi_1y"], 2),
        ("Volatility", &["kpis", "volatility"], 4),
        ("Beta", &["kpis", "beta"], 2),
    ];
    for (label, path, precision) in rows {
        let _ = writeln!(out, "| {label} | {} |", number(lookup(payload, path), precision));
    }
    out.push('\n');

    match payload.get("technical_analysis") {
        Some(Value::String(text)) if !text.trim().is_empty() => {
            let _ = writeln!(out, "### Technical Analysis\n\n{}\n", text.trim_end());
        }
        Some(Value::Object(signals)) if !signals.is_empty() => {
            let _ = writeln!(out, "### Technical Analysis\n");
            for (key, value) in signals {
                let _ = writeln!(out, "- {key}: {}", plain(value));
            }
            out.push('\n');
        }
        _ => {}
    }
}

fn write_stage_table(out: &mut String, context: &SharedContext) {
    let _ = writeln!(out, "## Stage Status\n");
    let _ = writeln!(out, "| Stage | Status |");
    let _ = writeln!(out, "|-------|--------|");
    for entry in context.entries() {
        let status = match entry.outcome.cause() {
            Some(cause) => format!("degraded ({cause})"),
            None => "completed".to_string(),
        };
        let _ = writeln!(out, "| {} | {status} |", entry.stage.display_name());
    }
}

/// Writes a section heading and returns the payload when the stage completed;
/// otherwise writes a placeholder line.
fn completed_payload<'a>(
    out: &mut String,
    heading: &str,
    outcome: Option<&'a StageOutcome>,
) -> Option<&'a Map<String, Value>> {
    let _ = writeln!(out, "## {heading}\n");
    match outcome {
        Some(StageOutcome::Completed { payload }) => Some(payload),
        Some(StageOutcome::Error { cause }) => {
            let _ = writeln!(out, "_Unavailable: {cause}_\n");
            None
        }
        None => {
            let _ = writeln!(out, "_Not run._\n");
            None
        }
    }
}

fn lookup<'a>(payload: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(payload.get(*first)?, |value, key| value.get(*key))
}

fn number(value: Option<&Value>, precision: usize) -> String {
    match value {
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) => format!("{f:.precision$}"),
            None => n.to_string(),
        },
        Some(Value::String(s)) => s.clone(),
        _ => "n/a".to_string(),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{ReportId, RunId};
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    fn context(outcomes: Vec<(Stage, StageOutcome)>) -> SharedContext {
        let mut ctx = SharedContext::new(
            Ticker::parse("ACME").unwrap(),
            ReportId::new(7),
            RunId::new_random(),
        );
        for (stage, outcome) in outcomes {
            ctx.record(stage, outcome).unwrap();
        }
        ctx
    }

    fn full_context() -> SharedContext {
        context(vec![
            (
                Stage::Research,
                StageOutcome::completed(payload(json!({
                    "sentiment": {
                        "sentiment_label": "bullish",
                        "sentiment_score": 0.4213,
                        "analyzed_articles": 12
                    },
                    "summary": "Coverage is broadly positive."
                }))),
            ),
            (
                Stage::Analysis,
                StageOutcome::completed(payload(json!({
                    "price": {"current_price": 101.5},
                    "kpis": {"pe_ratio": 18.25, "roi_1y": 12.0, "volatility": 0.2311},
                    "company": {"name": "Acme Corp"},
                    "technical_analysis": "Trading above the 50-day average."
                }))),
            ),
            (
                Stage::Synthesis,
                StageOutcome::completed(payload(json!({
                    "report": {"full_text": "Acme looks healthy."}
                }))),
            ),
        ])
    }

    #[test]
    fn renders_every_section_of_a_clean_run() {
        let doc = render_markdown(
            &Ticker::parse("ACME").unwrap(),
            &full_context(),
            Timestamp::now(),
        )
        .unwrap();

        assert!(doc.starts_with("# ACME Stock Analysis"));
        assert!(doc.contains("Acme looks healthy."));
        assert!(doc.contains("- **Sentiment:** BULLISH"));
        assert!(doc.contains("- **Articles analyzed:** 12"));
        assert!(doc.contains("| Current price | 101.50 |"));
        assert!(doc.contains("| P/E ratio | 18.25 |"));
        assert!(doc.contains("| Beta | n/a |"));
        assert!(doc.contains("**Company:** Acme Corp"));
        assert!(doc.contains("Trading above the 50-day average."));
        assert!(doc.contains("| Report Writer | completed |"));
    }

    #[test]
    fn degraded_stage_is_labelled() {
        let ctx = context(vec![
            (Stage::Research, StageOutcome::error("news feed empty")),
            (
                Stage::Analysis,
                StageOutcome::completed(payload(json!({"kpis": {}}))),
            ),
            (
                Stage::Synthesis,
                StageOutcome::completed(payload(json!({"report": {"full_text": "x"}}))),
            ),
        ]);
        let doc = render_markdown(ctx.subject(), &ctx, Timestamp::now()).unwrap();

        assert!(doc.contains("_Unavailable: news feed empty_"));
        assert!(doc.contains("| Market Researcher | degraded (news feed empty) |"));
    }

    #[test]
    fn empty_context_is_a_render_error() {
        let ctx = context(Vec::new());
        assert!(matches!(
            render_markdown(ctx.subject(), &ctx, Timestamp::now()),
            Err(SinkError::Render(_))
        ));
    }

    #[tokio::test]
    async fn persist_writes_named_file_into_created_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("reports");
        let sink = MarkdownReportSink::new(&dir);
        let ctx = full_context();

        let document = sink.persist(ctx.subject(), &ctx).await.unwrap().unwrap();

        let path = PathBuf::from(document.as_str());
        assert_eq!(sink.dir(), dir.as_path());
        assert_eq!(path.parent(), Some(dir.as_path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("report_ACME_7_"));
        assert!(name.ends_with(".md"));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("Acme looks healthy."));
    }

    #[tokio::test]
    async fn persist_fails_when_directory_cannot_be_created() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let sink = MarkdownReportSink::new(blocker.join("reports"));
        let ctx = full_context();

        assert!(matches!(
            sink.persist(ctx.subject(), &ctx).await,
            Err(SinkError::Io(_))
        ));
    }
}
