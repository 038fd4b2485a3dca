//! Tickerscope stage providers.
//!
//! Implements the [`pipeline::StageProvider`] trait over HTTP insight services:
//! one [`HttpStageProvider`] per stage, all sharing a single [`InsightClient`]
//! connection pool.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request encoding and response
//! classification live here. The orchestrator sees only
//! [`pipeline::StageProvider`] and the soft/hard split it defines.

pub mod client;
pub mod http;

pub use client::{parse_endpoint, InsightClient, ProviderError, DEFAULT_REQUEST_TIMEOUT};
pub use http::{interpret_response, HttpStageProvider};
pub use reqwest::Url;
