//! Compile/repair loop.
//!
//! Compiles the assembled program; on failure asks the model for a corrected
//! program using the catalog's `compiler_error` question. Each repair query is
//! a fresh two-message conversation carrying only the latest program and
//! diagnostic. The loop compiles at most `max_attempts` times and never sends
//! a repair query after the last failed compile.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::assembler::{strip_code_fences, AssembledProgram};
use super::error::{PipelineError, PipelineResult};
use super::orchestrator::Dispatcher;
use super::steps::REPAIR_QUESTION;
use crate::compiler::{CompileOutcome, Compiler};

pub(crate) struct RepairLoop {
    dispatcher: Dispatcher,
    compiler: Arc<dyn Compiler>,
    max_attempts: u32,
    temperature: f64,
}

impl RepairLoop {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        compiler: Arc<dyn Compiler>,
        max_attempts: u32,
        temperature: f64,
    ) -> Self {
        Self {
            dispatcher,
            compiler,
            max_attempts: max_attempts.max(1),
            temperature,
        }
    }

    pub(crate) async fn run(
        &self,
        description: &str,
        mut program: AssembledProgram,
    ) -> PipelineResult<AssembledProgram> {
        loop {
            self.dispatcher.check_cancelled(REPAIR_QUESTION)?;

            program.compile_attempts += 1;
            let attempt = program.compile_attempts;

            let outcome = self.compiler.compile(&program.source).await.map_err(|source| {
                PipelineError::Compiler {
                    attempt,
                    source,
                    program: program.source.clone(),
                }
            })?;

            let diagnostic = match outcome {
                CompileOutcome::Success => {
                    program.diagnostics = None;
                    return Ok(program);
                }
                CompileOutcome::Failed { diagnostic } => diagnostic,
            };

            warn!(
                attempt,
                max_attempts = self.max_attempts,
                diagnostic = %first_line(&diagnostic),
                "Scenic program failed to compile"
            );

            if attempt >= self.max_attempts {
                return Err(PipelineError::CompileFailed {
                    attempts: attempt,
                    diagnostic,
                    program: program.source,
                });
            }

            let prompt = {
                let bindings: BTreeMap<&str, &str> = [
                    ("description", description),
                    ("program", program.source.as_str()),
                    ("error", diagnostic.as_str()),
                ]
                .into();
                self.dispatcher
                    .catalog
                    .render(REPAIR_QUESTION, &bindings)
                    .map_err(PipelineError::from_catalog)?
            };

            let last_completion = program.transcript.last().map(|r| r.raw.clone());
            let record = self
                .dispatcher
                .ask(
                    REPAIR_QUESTION,
                    prompt,
                    self.temperature,
                    last_completion.as_deref(),
                )
                .await?;

            let repaired = strip_code_fences(&record.answer);
            if repaired.is_empty() {
                warn!(attempt, "Repair answer is empty; recompiling previous program");
            } else {
                program.source = repaired;
            }

            info!(attempt, "Received repaired program");
            program.repairs += 1;
            program.usage = program.usage.add(record.usage);
            program.diagnostics = Some(diagnostic);
            program.transcript.push(record);
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or(text)
}
