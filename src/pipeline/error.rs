//! Error types for Scenic program construction.
//!
//! Every fatal failure names the last step attempted and, where one exists,
//! the last raw completion or compiler diagnostic so a failed run can be
//! diagnosed without re-running it.

use thiserror::Error;

use super::config::ConfigError;
use crate::error::{CatalogError, CompilerError, LlmError};

/// Errors that abort an orchestration run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A template referenced a placeholder no earlier step produced.
    #[error("Step '{step}' cannot resolve placeholder '{{{placeholder}}}'")]
    TemplateResolution { step: String, placeholder: String },

    /// The model call failed after transport-level retries.
    #[error("Gateway call for step '{step}' failed: {source}")]
    Gateway {
        step: String,
        #[source]
        source: LlmError,
        /// Raw completion of the last step that did succeed.
        last_completion: Option<String>,
    },

    /// Every compile attempt failed.
    #[error("Program failed to compile after {attempts} attempts: {diagnostic}")]
    CompileFailed {
        attempts: u32,
        diagnostic: String,
        program: String,
    },

    /// The run was cancelled before `step` completed.
    #[error("Run cancelled at step '{step}'")]
    Cancelled { step: String },

    /// The prompt catalog could not be loaded or is inconsistent.
    #[error("Prompt catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The compiler could not be run at all.
    #[error("Compiler failed on attempt {attempt}: {source}")]
    Compiler {
        attempt: u32,
        #[source]
        source: CompilerError,
        program: String,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to initialise LLM client: {0}")]
    Client(#[source] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Maps a catalog failure, turning unbound placeholders into `TemplateResolution`.
    pub(crate) fn from_catalog(err: CatalogError) -> Self {
        match err {
            CatalogError::UnresolvedPlaceholder {
                template,
                placeholder,
            } => PipelineError::TemplateResolution {
                step: template,
                placeholder,
            },
            other => PipelineError::Catalog(other),
        }
    }

    /// The step the run was on when it failed, if known.
    pub fn step(&self) -> Option<&str> {
        match self {
            PipelineError::TemplateResolution { step, .. }
            | PipelineError::Gateway { step, .. }
            | PipelineError::Cancelled { step } => Some(step),
            PipelineError::CompileFailed { .. } | PipelineError::Compiler { .. } => {
                Some(super::steps::REPAIR_QUESTION)
            }
            _ => None,
        }
    }

    /// The last raw completion or compiler diagnostic carried by the error.
    pub fn last_output(&self) -> Option<&str> {
        match self {
            PipelineError::Gateway {
                last_completion, ..
            } => last_completion.as_deref(),
            PipelineError::CompileFailed { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }

    /// The last program text, for compile-stage failures.
    pub fn program(&self) -> Option<&str> {
        match self {
            PipelineError::CompileFailed { program, .. }
            | PipelineError::Compiler { program, .. } => Some(program),
            _ => None,
        }
    }

    /// Whether the failure came from cancellation rather than an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}
