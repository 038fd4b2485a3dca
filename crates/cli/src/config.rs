//! `tickerscope.toml` configuration.
//!
//! Every section and key is optional; absent values fall back to the defaults
//! below. A minimal file only needs the insight-service endpoints:
//!
//! ```toml
//! [providers]
//! research_url = "http://localhost:8081/research"
//! analysis_url = "http://localhost:8082/analysis"
//! synthesis_url = "http://localhost:8083/synthesis"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use orchestrator::{OrchestratorConfig, WorkerPoolConfig};
use pipeline::{ProgressPlan, Stage};
use providers::{parse_endpoint, ProviderError, Url};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read config file {path}: {source}")]
    Read {
        /// The file that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the expected layout.
    #[error("could not parse config file {path}: {source}")]
    Parse {
        /// The file that was parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid value for '{key}': {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        key: &'static str,
        /// What is wrong with the value.
        reason: String,
    },

    /// A stage has no provider endpoint.
    #[error("no endpoint configured for the {0} stage")]
    MissingEndpoint(Stage),

    /// A provider endpoint is not a usable URL.
    #[error(transparent)]
    Endpoint(#[from] ProviderError),
}

/// Which [`pipeline::JobStore`]/[`pipeline::ReportStore`] implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// A SQLite database file that persists between invocations.
    Sqlite,
    /// Process-local maps; nothing survives the process.
    Memory,
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Store implementation.
    pub backend: StorageBackend,
    /// SQLite database file.
    pub path: PathBuf,
    /// Directory receiving rendered report documents.
    pub reports_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("tickerscope.db"),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

/// `[workers]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of concurrent analysis workers.
    pub count: usize,
    /// Requests that may wait for a free worker.
    pub queue_capacity: usize,
    /// Per-stage timeout in seconds; `0` disables the timeout.
    pub stage_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let pool = WorkerPoolConfig::default();
        Self {
            count: pool.workers,
            queue_capacity: pool.queue_capacity,
            stage_timeout_secs: orchestrator::DEFAULT_STAGE_TIMEOUT.as_secs(),
        }
    }
}

/// `[providers]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Endpoint of the research insight service.
    pub research_url: Option<String>,
    /// Endpoint of the financial analysis service.
    pub analysis_url: Option<String>,
    /// Endpoint of the report synthesis service.
    pub synthesis_url: Option<String>,
    /// Whole-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            research_url: None,
            analysis_url: None,
            synthesis_url: None,
            request_timeout_secs: providers::DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ProvidersConfig {
    /// The validated endpoint of every stage, in execution order.
    pub fn endpoints(&self) -> Result<Vec<(Stage, Url)>, ConfigError> {
        Stage::ALL
            .iter()
            .map(|&stage| {
                let raw = match stage {
                    Stage::Research => &self.research_url,
                    Stage::Analysis => &self.analysis_url,
                    Stage::Synthesis => &self.synthesis_url,
                };
                let raw = raw.as_deref().ok_or(ConfigError::MissingEndpoint(stage))?;
                Ok((stage, parse_endpoint(raw)?))
            })
            .collect()
    }

    /// [`ProvidersConfig::request_timeout_secs`] as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// OTLP gRPC collector endpoint; tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
            otlp_endpoint: None,
        }
    }
}

/// Complete CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where records and documents are kept.
    pub storage: StorageConfig,
    /// Worker pool and run-loop tunables.
    pub workers: WorkerConfig,
    /// Insight service endpoints.
    pub providers: ProvidersConfig,
    /// Log output and trace export.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads and validates the file at `path`, or returns the defaults when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::parse(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Checks value ranges. Endpoints are checked by
    /// [`ProvidersConfig::endpoints`] since only `analyze` needs them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.count == 0 {
            return Err(ConfigError::Invalid {
                key: "workers.count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.workers.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "workers.queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.providers.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "providers.request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.path.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid {
                key: "storage.path",
                reason: "required for the sqlite backend".to_string(),
            });
        }
        if let Some(endpoint) = &self.logging.otlp_endpoint {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "logging.otlp_endpoint",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Worker pool settings.
    pub fn pool(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers: self.workers.count,
            queue_capacity: self.workers.queue_capacity,
        }
    }

    /// Run-loop settings; a stage timeout of `0` waits forever.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        let stage_timeout = match self.workers.stage_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        OrchestratorConfig {
            plan: ProgressPlan::default(),
            stage_timeout,
        }
    }
}
