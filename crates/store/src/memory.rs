//! Process-local store backed by hash maps.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use pipeline::{
    JobRecord, JobStore, RecordKind, Report, ReportId, ReportStore, ReportSummary, StoreError,
    Ticker,
};

#[derive(Default)]
struct Tables {
    last_id: u64,
    reports: HashMap<ReportId, Report>,
    jobs: HashMap<ReportId, JobRecord>,
}

/// [`JobStore`] and [`ReportStore`] over in-process maps.
///
/// Records are cloned in and out whole, so a concurrent reader never sees a
/// partially applied save. Contents are lost when the store is dropped.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::unavailable("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn load_job(&self, id: ReportId) -> Result<JobRecord, StoreError> {
        self.lock()?
            .jobs
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: RecordKind::Job,
                id,
            })
    }

    async fn save_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        self.lock()?.jobs.insert(job.report_id(), job.clone());
        Ok(())
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn create_report(&self, ticker: &Ticker) -> Result<Report, StoreError> {
        let mut tables = self.lock()?;
        tables.last_id += 1;
        let report = Report::pending(ReportId::new(tables.last_id), ticker.clone());
        tables.reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn load_report(&self, id: ReportId) -> Result<Report, StoreError> {
        self.lock()?
            .reports
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: RecordKind::Report,
                id,
            })
    }

    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        match tables.reports.get_mut(&report.id) {
            Some(stored) => {
                *stored = report.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: RecordKind::Report,
                id: report.id,
            }),
        }
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<ReportSummary>, StoreError> {
        let tables = self.lock()?;
        let mut reports: Vec<&Report> = tables.reports.values().collect();
        reports.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(reports
            .into_iter()
            .take(limit)
            .map(ReportSummary::from)
            .collect())
    }
}
