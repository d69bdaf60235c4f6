//! Step orchestrator for compositional Scenic program construction.
//!
//! Drives the fixed step chain (one → nine → four.b → five → six), hands the
//! accumulated answers to the assembler and runs the compile/repair loop.
//!
//! Every query goes through a [`Dispatcher`], which checks cancellation,
//! sends the two-message conversation, optionally logs the raw completion
//! and extracts the final answer.

use std::sync::Arc;

use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use super::assembler::{assemble, AssembledProgram};
use super::cancel::CancelSignal;
use super::config::{ConfigError, PipelineConfig};
use super::error::{PipelineError, PipelineResult};
use super::extract::extract_final_answer;
use super::repair::RepairLoop;
use super::steps::{verify_catalog, Artifact, Artifacts, StepSpec, PIPELINE_STEPS};
use crate::compiler::{Compiler, ScenicCompiler};
use crate::llm::{Conversation, Gateway, Usage};
use crate::prompts::PromptCatalog;

/// Tracing target for verbose step transcripts.
///
/// The CLI enables this target at `info` whenever `--verbose` is set, so
/// the transcript survives a stricter `--log-level`.
pub const TRANSCRIPT_TARGET: &str = "scenic_nl::transcript";

/// The caller's natural-language scene description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInput {
    description: String,
}

impl ModelInput {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// One dispatched query and what was extracted from it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: String,
    /// Rendered user message.
    pub prompt: String,
    /// Raw completion text.
    pub raw: String,
    /// Text after the last final-answer marker.
    pub answer: String,
    pub marker_found: bool,
    pub usage: Usage,
}

/// Results of the step chain before assembly.
#[derive(Debug, Clone)]
pub struct StepOutputs {
    pub artifacts: Artifacts,
    pub transcript: Vec<StepRecord>,
    pub usage: Usage,
}

impl StepOutputs {
    pub fn last_completion(&self) -> Option<&str> {
        self.transcript.last().map(|r| r.raw.as_str())
    }
}

/// Sends step queries on behalf of the orchestrator and the repair loop.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    pub(crate) gateway: Gateway,
    pub(crate) catalog: Arc<PromptCatalog>,
    pub(crate) cancel: Option<CancelSignal>,
    pub(crate) max_tokens: Option<u32>,
    pub(crate) verbose: bool,
}

impl Dispatcher {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }

    /// Fails with `Cancelled` if cancellation was requested.
    pub(crate) fn check_cancelled(&self, step: &str) -> PipelineResult<()> {
        if self.is_cancelled() {
            info!(step, "Run cancelled");
            return Err(PipelineError::Cancelled {
                step: step.to_string(),
            });
        }
        Ok(())
    }

    /// Sends one rendered question and extracts its answer.
    pub(crate) async fn ask(
        &self,
        step: &str,
        prompt: String,
        temperature: f64,
        last_completion: Option<&str>,
    ) -> PipelineResult<StepRecord> {
        self.check_cancelled(step)?;

        let conversation = Conversation::new(self.catalog.context(), prompt.clone());
        let query = self
            .gateway
            .query(&conversation, temperature, self.max_tokens);

        let result = match &self.cancel {
            Some(cancel) => {
                tokio::select! {
                    result = query => result,
                    _ = cancel.cancelled() => {
                        info!(step, "Run cancelled during gateway call");
                        return Err(PipelineError::Cancelled { step: step.to_string() });
                    }
                }
            }
            None => query.await,
        };

        let completion = result.map_err(|source| PipelineError::Gateway {
            step: step.to_string(),
            source,
            last_completion: last_completion.map(str::to_string),
        })?;

        if self.verbose {
            info!(target: TRANSCRIPT_TARGET, "--- BEGIN: Question {} Response ---", step);
            info!(target: TRANSCRIPT_TARGET, "{}", completion.text);
            info!(target: TRANSCRIPT_TARGET, "--- END: Question {} Response ---", step);
        }

        let extraction = extract_final_answer(&completion.text);
        debug!(
            step,
            attempts = completion.attempts,
            marker_found = extraction.marker_found,
            answer_chars = extraction.answer.len(),
            "Step answered"
        );

        Ok(StepRecord {
            step: step.to_string(),
            prompt,
            raw: completion.text,
            answer: extraction.answer,
            marker_found: extraction.marker_found,
            usage: completion.usage,
        })
    }
}

/// Runs the step chain, assembly and repair loop for one description at a time.
///
/// Holds only read-only state, so one orchestrator can serve concurrent runs.
pub struct StepOrchestrator {
    gateway: Gateway,
    catalog: Arc<PromptCatalog>,
    compiler: Arc<dyn Compiler>,
    config: PipelineConfig,
    cancel: Option<CancelSignal>,
}

impl std::fmt::Debug for StepOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepOrchestrator")
            .field("gateway", &self.gateway)
            .field("config", &self.config)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl StepOrchestrator {
    /// Creates an orchestrator from explicit parts.
    pub fn new(
        gateway: Gateway,
        catalog: Arc<PromptCatalog>,
        compiler: Arc<dyn Compiler>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            catalog,
            compiler,
            config,
            cancel: None,
        }
    }

    /// Creates an orchestrator with an HTTP gateway and the external compiler.
    pub fn from_config(
        config: PipelineConfig,
        catalog: Arc<PromptCatalog>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let gateway =
            Gateway::from_config(config.gateway.clone()).map_err(PipelineError::Client)?;
        let compiler =
            ScenicCompiler::new(config.compiler_command.clone(), config.compiler_timeout)
                .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        Ok(Self::new(gateway, catalog, Arc::new(compiler), config))
    }

    /// Attaches a cancellation signal checked between steps and during calls.
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    fn dispatcher(&self, verbose: bool) -> Dispatcher {
        Dispatcher {
            gateway: self.gateway.clone(),
            catalog: Arc::clone(&self.catalog),
            cancel: self.cancel.clone(),
            max_tokens: self.config.max_tokens,
            verbose,
        }
    }

    /// Builds a Scenic program for `input` and compiles it, repairing on failure.
    ///
    /// # Errors
    ///
    /// Fails on template resolution, gateway or compiler infrastructure
    /// errors, on cancellation, and with `CompileFailed` once
    /// `max_compile_attempts` compiles have all been rejected.
    pub async fn run(
        &self,
        input: &ModelInput,
        temperature: f64,
        verbose: bool,
    ) -> PipelineResult<AssembledProgram> {
        let span = info_span!("scenic_run", run_id = %Uuid::new_v4());
        async {
            info!(
                model = %self.gateway.config().model,
                temperature,
                "Constructing Scenic program"
            );

            let outputs = self.execute_steps(input, temperature, verbose).await?;

            let refined = artifact(&outputs.artifacts, Artifact::RefinedObjects)?;
            let distributions = artifact(&outputs.artifacts, Artifact::ScenicDistributions)?;
            let source = assemble(input.description(), refined, distributions);
            let program = AssembledProgram::new(source, outputs.transcript, outputs.usage);

            let repair = RepairLoop::new(
                self.dispatcher(verbose),
                Arc::clone(&self.compiler),
                self.config.max_compile_attempts,
                self.config.effective_repair_temperature(temperature),
            );
            let program = repair.run(input.description(), program).await?;

            info!(
                compile_attempts = program.compile_attempts,
                repairs = program.repairs,
                total_tokens = program.usage.total_tokens,
                "Scenic program compiled"
            );
            Ok(program)
        }
        .instrument(span)
        .await
    }

    /// Runs only the step chain, without assembly or compilation.
    pub async fn run_steps(
        &self,
        input: &ModelInput,
        temperature: f64,
        verbose: bool,
    ) -> PipelineResult<StepOutputs> {
        let span = info_span!("scenic_steps", run_id = %Uuid::new_v4());
        self.execute_steps(input, temperature, verbose)
            .instrument(span)
            .await
    }

    async fn execute_steps(
        &self,
        input: &ModelInput,
        temperature: f64,
        verbose: bool,
    ) -> PipelineResult<StepOutputs> {
        verify_catalog(PIPELINE_STEPS, &self.catalog).map_err(PipelineError::from_catalog)?;

        let dispatcher = self.dispatcher(verbose);
        let mut outputs = StepOutputs {
            artifacts: Artifacts::new(input.description()),
            transcript: Vec::with_capacity(PIPELINE_STEPS.len()),
            usage: Usage::default(),
        };

        for step in PIPELINE_STEPS {
            let record = self.run_step(&dispatcher, step, &outputs, temperature).await?;
            outputs.artifacts.insert(step.produces, record.answer.clone());
            outputs.usage = outputs.usage.add(record.usage);
            outputs.transcript.push(record);
        }

        Ok(outputs)
    }

    async fn run_step(
        &self,
        dispatcher: &Dispatcher,
        step: &StepSpec,
        outputs: &StepOutputs,
        temperature: f64,
    ) -> PipelineResult<StepRecord> {
        dispatcher.check_cancelled(step.id)?;
        debug!(step = step.id, "Formatting step question");

        let bindings = outputs.artifacts.bindings_for(step).map_err(|binding| {
            PipelineError::TemplateResolution {
                step: step.id.to_string(),
                placeholder: binding.placeholder.to_string(),
            }
        })?;
        let prompt = self
            .catalog
            .render(step.id, &bindings)
            .map_err(PipelineError::from_catalog)?;

        dispatcher
            .ask(step.id, prompt, temperature, outputs.last_completion())
            .await
    }
}

fn artifact(artifacts: &Artifacts, which: Artifact) -> PipelineResult<&str> {
    artifacts
        .get(which)
        .ok_or_else(|| PipelineError::TemplateResolution {
            step: "assemble".to_string(),
            placeholder: which.name().to_string(),
        })
}
