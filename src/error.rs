//! Error types for scenic-nl operations.
//!
//! Defines error types for the subsystems the pipeline depends on:
//! - LLM gateway interactions
//! - Prompt catalog loading and template rendering
//! - External Scenic compiler invocation

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The request never got a response: connect failure, reset or transport timeout.
    #[error("Connection to LLM endpoint failed: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("LLM returned no completion choices")]
    EmptyResponse,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    /// Whether the failure is worth retrying at the transport level.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RequestFailed(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("temporarily")
            }
            LlmError::Connection(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::RateLimited(_) => true,
            LlmError::ApiError { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

/// Errors that can occur while loading or rendering prompt templates.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read prompt catalog '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Prompt catalog has no top-level 'context' entry")]
    MissingContext,

    #[error("Question '{0}' not found in prompt catalog")]
    QuestionNotFound(String),

    #[error("Entry '{0}' is a group of sub-questions, not a question")]
    NotAQuestion(String),

    #[error("Template '{template}' references unknown placeholder '{{{placeholder}}}'")]
    UnresolvedPlaceholder {
        template: String,
        placeholder: String,
    },
}

/// Errors raised by the compiler harness itself (not compile diagnostics).
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Failed to spawn compiler '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Compiler timed out after {0:?}")]
    Timeout(Duration),

    #[error("Compiler command is empty")]
    EmptyCommand,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
