//! Tickerscope persistence adapters.
//!
//! Implements the [`pipeline::JobStore`], [`pipeline::ReportStore`] and
//! [`pipeline::ResultSink`] ports:
//!
//! | Type | Implements | Backing |
//! |------|------------|---------|
//! | [`SqliteStore`] | `JobStore`, `ReportStore` | SQLite file or in-memory database |
//! | [`InMemoryStore`] | `JobStore`, `ReportStore` | process-local maps |
//! | [`MarkdownReportSink`] | `ResultSink` | Markdown files in a directory |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All SQL and file-system access lives here. The
//! orchestrator sees only the port traits.

pub mod document;
pub mod memory;
pub mod sqlite;

pub use document::{render_markdown, MarkdownReportSink};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
