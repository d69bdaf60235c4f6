//! Compositional Scenic program construction.
//!
//! This module turns a natural-language driving-scene description into a
//! Scenic program by chaining focused model queries, assembling their answers
//! into declarations, and validating the result with the Scenic compiler.
//!
//! # Architecture
//!
//! - **Steps**: the typed, statically verified step chain
//! - **Orchestrator**: runs the chain and threads each answer into later steps
//! - **Extract**: pulls the final answer out of expert-deliberation completions
//! - **Assembler**: builds the constants and variables section of the program
//! - **Repair**: compiles and asks the model to fix compiler errors
//! - **Config**: configuration for all of the above
//!
//! # Pipeline Flow
//!
//! 1. **one**: list the objects in the description
//! 2. **nine**: refine the object list to Scenic class names
//! 3. **four.b**: find what the description leaves unstated about each object
//! 4. **five**: propose generic probability distributions for those facts
//! 5. **six**: rewrite them as Scenic distribution declarations
//! 6. **Assembly**: objects become constants, distributions become variables
//! 7. **Compile/repair**: up to `max_compile_attempts` compiles
//!
//! # Example
//!
//! ```rust,ignore
//! use scenic_nl::pipeline::{construct_scenic_program, PipelineConfig};
//!
//! let config = PipelineConfig::from_env()?;
//! let program = construct_scenic_program(
//!     &config,
//!     "A pedestrian crosses in front of a parked car on a two-lane road.",
//!     0.7,
//!     None,
//!     false,
//! )
//! .await?;
//!
//! println!("{}", program.source);
//! ```
//!
//! # Cancellation
//!
//! ```rust,ignore
//! let (handle, signal) = cancel_pair();
//! let orchestrator = StepOrchestrator::from_config(config, catalog)?.with_cancel_signal(signal);
//! // elsewhere: handle.cancel();
//! ```

pub mod assembler;
pub mod cancel;
pub mod config;
pub mod error;
pub mod extract;
pub mod orchestrator;
mod repair;
pub mod steps;

use std::sync::Arc;

use crate::prompts::PromptCatalog;

// Re-export main types for convenience
pub use assembler::{assemble, AssembledProgram};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::{ConfigError, PipelineConfig};
pub use error::{PipelineError, PipelineResult};
pub use extract::{extract_final_answer, Extraction, FINAL_ANSWER_MARKER};
pub use orchestrator::{
    ModelInput, StepOrchestrator, StepOutputs, StepRecord, TRANSCRIPT_TARGET,
};
pub use steps::{validate_chain, verify_catalog, Artifact, StepSpec, PIPELINE_STEPS};

/// Loads the configured prompt catalog, or the bundled one.
pub fn load_catalog(config: &PipelineConfig) -> PipelineResult<PromptCatalog> {
    let catalog = match &config.prompt_file {
        Some(path) => PromptCatalog::from_path(path)?,
        None => PromptCatalog::builtin()?,
    };
    Ok(catalog)
}

/// Builds and compiles a Scenic program for one description.
///
/// `max_tokens` overrides the configured completion limit when set.
pub async fn construct_scenic_program(
    config: &PipelineConfig,
    description: &str,
    temperature: f64,
    max_tokens: Option<u32>,
    verbose: bool,
) -> PipelineResult<AssembledProgram> {
    let catalog = Arc::new(load_catalog(config)?);
    let config = config
        .clone()
        .with_temperature(temperature)
        .with_max_tokens(max_tokens.or(config.max_tokens));
    let orchestrator = StepOrchestrator::from_config(config, catalog)?;
    orchestrator
        .run(&ModelInput::new(description), temperature, verbose)
        .await
}
