//! scenic-nl: natural-language to Scenic program generation.
//!
//! This library turns a description of a driving scene into a Scenic program
//! by chaining expert-panel LLM queries, assembling their answers into
//! declarations, and validating the result with the Scenic compiler.

// Core modules
pub mod cli;
pub mod compiler;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;

// Re-export commonly used error types
pub use error::{CatalogError, CompilerError, LlmError};
pub use pipeline::{construct_scenic_program, PipelineError};
