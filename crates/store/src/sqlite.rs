//! SQLite-backed store.
//!
//! Two tables mirror the domain records: `reports` (the parent entity) and
//! `analysis_jobs` (one row per report, keyed by the report id). Every save is
//! a single statement, so SQLite applies it atomically and a concurrent reader
//! never observes a partial checkpoint.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    DocumentRef, JobRecord, JobStatus, JobStore, Progress, RecordKind, Report, ReportId,
    ReportStatus, ReportStore, ReportSummary, Stage, StoreError, Ticker, Timestamp,
};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reports (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker        TEXT NOT NULL,
    status        TEXT NOT NULL,
    result_json   TEXT,
    document_ref  TEXT,
    created_at    TEXT NOT NULL,
    completed_at  TEXT
);
CREATE INDEX IF NOT EXISTS idx_reports_ticker ON reports (ticker);
CREATE INDEX IF NOT EXISTS idx_reports_created_at ON reports (created_at);

CREATE TABLE IF NOT EXISTS analysis_jobs (
    report_id     INTEGER PRIMARY KEY,
    status        TEXT NOT NULL,
    current_stage TEXT,
    progress      REAL NOT NULL,
    log_summary   TEXT,
    error_detail  TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`JobStore`] and [`ReportStore`] over a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if necessary) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(sql)?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "SQLite store opened");
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(sql)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(sql)?;
        conn.execute_batch(SCHEMA).map_err(sql)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

fn sql(err: rusqlite::Error) -> StoreError {
    StoreError::unavailable(format!("sqlite: {err}"))
}

fn corrupt(kind: RecordKind, id: ReportId, message: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        kind,
        id,
        message: message.into(),
    }
}

fn to_sql_id(id: ReportId) -> Result<i64, StoreError> {
    i64::try_from(id.as_u64()).map_err(|_| StoreError::unavailable(format!("id {id} out of range")))
}

fn parse_timestamp(kind: RecordKind, id: ReportId, raw: &str) -> Result<Timestamp, StoreError> {
    Timestamp::parse_rfc3339(raw).ok_or_else(|| corrupt(kind, id, format!("bad timestamp '{raw}'")))
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

struct JobRow {
    status: String,
    current_stage: Option<String>,
    progress: f64,
    log_summary: Option<String>,
    error_detail: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn into_record(self, id: ReportId) -> Result<JobRecord, StoreError> {
        let kind = RecordKind::Job;
        let status = JobStatus::from_status(&self.status)
            .ok_or_else(|| corrupt(kind, id, format!("unknown status '{}'", self.status)))?;
        let current_stage = match self.current_stage.as_deref() {
            Some(name) => Some(
                Stage::from_name(name)
                    .ok_or_else(|| corrupt(kind, id, format!("unknown stage '{name}'")))?,
            ),
            None => None,
        };
        let progress = Progress::new(self.progress)
            .ok_or_else(|| corrupt(kind, id, format!("progress {} out of range", self.progress)))?;
        Ok(JobRecord::restore(
            id,
            status,
            current_stage,
            progress,
            self.log_summary,
            self.error_detail,
            parse_timestamp(kind, id, &self.created_at)?,
            parse_timestamp(kind, id, &self.updated_at)?,
        ))
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn load_job(&self, id: ReportId) -> Result<JobRecord, StoreError> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                "SELECT status, current_stage, progress, log_summary, error_detail, created_at, updated_at
                 FROM analysis_jobs WHERE report_id = ?1",
                params![to_sql_id(id)?],
                |row| {
                    Ok(JobRow {
                        status: row.get(0)?,
                        current_stage: row.get(1)?,
                        progress: row.get(2)?,
                        log_summary: row.get(3)?,
                        error_detail: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(sql)?;
        match row {
            Some(row) => row.into_record(id),
            None => Err(StoreError::NotFound {
                kind: RecordKind::Job,
                id,
            }),
        }
    }

    async fn save_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO analysis_jobs
                 (report_id, status, current_stage, progress, log_summary, error_detail, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (report_id) DO UPDATE SET
                 status = excluded.status,
                 current_stage = excluded.current_stage,
                 progress = excluded.progress,
                 log_summary = excluded.log_summary,
                 error_detail = excluded.error_detail,
                 updated_at = excluded.updated_at",
            params![
                to_sql_id(job.report_id())?,
                job.status().as_str(),
                job.current_stage().map(Stage::as_str),
                job.progress().as_f64(),
                job.log_summary(),
                job.error_detail(),
                job.created_at().to_string(),
                job.updated_at().to_string(),
            ],
        )
        .map_err(sql)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

struct ReportRow {
    ticker: String,
    status: String,
    result_json: Option<String>,
    document_ref: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl ReportRow {
    fn into_report(self, id: ReportId) -> Result<Report, StoreError> {
        let kind = RecordKind::Report;
        let ticker = Ticker::parse(&self.ticker)
            .ok_or_else(|| corrupt(kind, id, format!("bad ticker '{}'", self.ticker)))?;
        let status = ReportStatus::from_status(&self.status)
            .ok_or_else(|| corrupt(kind, id, format!("unknown status '{}'", self.status)))?;
        let artifact = match self.result_json {
            Some(json) => Some(
                serde_json::from_str(&json)
                    .map_err(|err| corrupt(kind, id, format!("bad result json: {err}")))?,
            ),
            None => None,
        };
        let completed_at = match self.completed_at.as_deref() {
            Some(raw) => Some(parse_timestamp(kind, id, raw)?),
            None => None,
        };
        Ok(Report {
            id,
            ticker,
            status,
            artifact,
            document: self.document_ref.and_then(DocumentRef::new),
            created_at: parse_timestamp(kind, id, &self.created_at)?,
            completed_at,
        })
    }
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn create_report(&self, ticker: &Ticker) -> Result<Report, StoreError> {
        let db = self.db.lock().await;
        let mut report = Report::pending(ReportId::new(0), ticker.clone());
        db.execute(
            "INSERT INTO reports (ticker, status, created_at) VALUES (?1, ?2, ?3)",
            params![
                report.ticker.as_str(),
                report.status.as_str(),
                report.created_at.to_string()
            ],
        )
        .map_err(sql)?;
        let rowid = db.last_insert_rowid();
        let id = u64::try_from(rowid)
            .map_err(|_| StoreError::unavailable(format!("negative row id {rowid}")))?;
        report.id = ReportId::new(id);
        Ok(report)
    }

    async fn load_report(&self, id: ReportId) -> Result<Report, StoreError> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                "SELECT ticker, status, result_json, document_ref, created_at, completed_at
                 FROM reports WHERE id = ?1",
                params![to_sql_id(id)?],
                |row| {
                    Ok(ReportRow {
                        ticker: row.get(0)?,
                        status: row.get(1)?,
                        result_json: row.get(2)?,
                        document_ref: row.get(3)?,
                        created_at: row.get(4)?,
                        completed_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(sql)?;
        match row {
            Some(row) => row.into_report(id),
            None => Err(StoreError::NotFound {
                kind: RecordKind::Report,
                id,
            }),
        }
    }

    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let result_json = report
            .artifact
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| StoreError::unavailable(format!("artifact encoding failed: {err}")))?;
        let db = self.db.lock().await;
        let updated = db
            .execute(
                "UPDATE reports
                 SET status = ?1, result_json = ?2, document_ref = ?3, completed_at = ?4
                 WHERE id = ?5",
                params![
                    report.status.as_str(),
                    result_json,
                    report.document.as_ref().map(DocumentRef::as_str),
                    report.completed_at.map(|ts| ts.to_string()),
                    to_sql_id(report.id)?,
                ],
            )
            .map_err(sql)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: RecordKind::Report,
                id: report.id,
            });
        }
        Ok(())
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<ReportSummary>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let db = self.db.lock().await;
        let mut stmt = db
            .prepare(
                "SELECT id, ticker, status, created_at, completed_at
                 FROM reports ORDER BY created_at DESC, id DESC LIMIT ?1",
            )
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    ReportRow {
                        ticker: row.get(1)?,
                        status: row.get(2)?,
                        result_json: None,
                        document_ref: None,
                        created_at: row.get(3)?,
                        completed_at: row.get(4)?,
                    },
                ))
            })
            .map_err(sql)?;

        let mut summaries = Vec::new();
        for row in rows {
            let (rowid, row) = row.map_err(sql)?;
            let id = u64::try_from(rowid)
                .map(ReportId::new)
                .map_err(|_| StoreError::unavailable(format!("negative row id {rowid}")))?;
            summaries.push(ReportSummary::from(&row.into_report(id)?));
        }
        Ok(summaries)
    }
}
