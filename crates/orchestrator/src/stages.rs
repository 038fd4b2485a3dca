//! The fixed, ordered set of stage providers a run drives.

use std::sync::Arc;

use pipeline::{Stage, StageProvider};
use thiserror::Error;

/// A provider list that does not match the pipeline's stage order.
#[derive(Debug, Error, PartialEq)]
pub enum StagePipelineError {
    /// Fewer or more providers than stages.
    #[error("expected {expected} stage providers, got {actual}")]
    WrongCount {
        /// Number of pipeline stages.
        expected: usize,
        /// Number of providers supplied.
        actual: usize,
    },

    /// A provider sits in another stage's slot.
    #[error("provider for '{actual}' supplied where '{expected}' runs")]
    Misplaced {
        /// The stage that runs at this position.
        expected: Stage,
        /// The stage the provider serves.
        actual: Stage,
    },
}

/// Providers for research, analysis and synthesis, in that order.
#[derive(Clone)]
pub struct StagePipeline {
    providers: Vec<Arc<dyn StageProvider>>,
}

impl StagePipeline {
    /// Builds a pipeline from one provider per stage, in execution order.
    pub fn new(providers: Vec<Arc<dyn StageProvider>>) -> Result<Self, StagePipelineError> {
        if providers.len() != Stage::ALL.len() {
            return Err(StagePipelineError::WrongCount {
                expected: Stage::ALL.len(),
                actual: providers.len(),
            });
        }
        for (expected, provider) in Stage::ALL.iter().zip(&providers) {
            if provider.stage() != *expected {
                return Err(StagePipelineError::Misplaced {
                    expected: *expected,
                    actual: provider.stage(),
                });
            }
        }
        Ok(Self { providers })
    }

    /// Iterates `(stage, provider)` pairs in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &Arc<dyn StageProvider>)> {
        Stage::ALL.into_iter().zip(self.providers.iter())
    }
}

impl std::fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.stage()))
            .finish()
    }
}
