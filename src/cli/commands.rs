//! CLI command definitions for gen-scenic.
//!
//! `generate` turns a scene description into a compiled Scenic program;
//! `check-prompts` validates a prompt catalog against the step chain without
//! calling the model.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::pipeline::{
    cancel_pair, config::parse_command, load_catalog, validate_chain, verify_catalog,
    AssembledProgram, ModelInput, PipelineConfig, PipelineError, StepOrchestrator,
    PIPELINE_STEPS, TRANSCRIPT_TARGET,
};

/// Natural-language to Scenic program generator.
#[derive(Parser)]
#[command(name = "gen-scenic")]
#[command(about = "Generate Scenic driving-scene programs from natural-language descriptions")]
#[command(version)]
#[command(
    long_about = "gen-scenic builds a Scenic program from a description of a driving scene by chaining expert-panel LLM queries, then validates it with the Scenic compiler and repairs it on failure.\n\nExample usage:\n  gen-scenic generate -d \"A pedestrian crosses in front of a parked car on a two-lane road.\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

impl Cli {
    /// Whether step transcripts were requested by flag or `SCENIC_NL_VERBOSE`.
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Generate(args) => {
                args.verbose || PipelineConfig::from_env().is_ok_and(|c| c.verbose)
            }
            Commands::CheckPrompts(_) => false,
        }
    }

    /// Log filter from `rust_log` (normally `RUST_LOG`), falling back to `--log-level`.
    ///
    /// Verbose runs always keep the transcript target at `info`.
    pub fn env_filter(&self, rust_log: Option<&str>) -> EnvFilter {
        let mut filter = rust_log
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(&self.log_level));
        if self.verbose() {
            if let Ok(directive) = format!("{}=info", TRANSCRIPT_TARGET).parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a Scenic program from a scene description.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Validate a prompt catalog against the step chain.
    CheckPrompts(CheckPromptsArgs),
}

/// Arguments for the generate command.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Scene description. Read from --input-file or stdin when omitted.
    #[arg(short = 'd', long, conflicts_with = "input_file")]
    pub description: Option<String>,

    /// File containing the scene description.
    #[arg(short = 'i', long)]
    pub input_file: Option<PathBuf>,

    /// Sampling temperature for every query.
    #[arg(short = 't', long)]
    pub temperature: Option<f64>,

    /// Maximum tokens per completion.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Log each step's raw completion.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Prompt catalog YAML to use instead of the bundled one.
    #[arg(short = 'p', long)]
    pub prompt_file: Option<PathBuf>,

    /// Total compile attempts, including the first.
    #[arg(short = 'a', long)]
    pub max_compile_attempts: Option<u32>,

    /// Temperature for compiler-error repair queries.
    #[arg(long)]
    pub repair_temperature: Option<f64>,

    /// OpenAI-compatible endpoint base URL.
    #[arg(long)]
    pub api_base: Option<String>,

    /// API key for the endpoint.
    #[arg(long, env = "SCENIC_NL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name sent to the endpoint.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Compiler command (JSON array or space-separated); the program path is appended.
    #[arg(long)]
    pub compiler: Option<String>,

    /// Write the program to this file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output a JSON report to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for the check-prompts command.
#[derive(Parser, Debug)]
pub struct CheckPromptsArgs {
    /// Prompt catalog YAML to check. Checks the bundled catalog when omitted.
    #[arg(short = 'p', long)]
    pub prompt_file: Option<PathBuf>,
}

/// JSON report for a generate run.
#[derive(Debug, Serialize)]
struct GenerationOutput {
    status: String,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compile_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repairs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unmarked_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    program: Option<String>,
}

impl From<&PipelineError> for FailureOutput {
    fn from(err: &PipelineError) -> Self {
        Self {
            message: err.to_string(),
            step: err.step().map(str::to_string),
            last_output: err.last_output().map(str::to_string),
            program: err.program().map(str::to_string),
        }
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::CheckPrompts(args) => run_check_prompts_command(args),
    }
}

// ============================================================================
// Generate Command Implementation
// ============================================================================

/// Merges environment configuration with command-line overrides.
fn build_config(args: &GenerateArgs) -> anyhow::Result<PipelineConfig> {
    let mut config =
        PipelineConfig::from_env().context("Invalid SCENIC_NL_* environment configuration")?;

    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }
    if args.max_tokens.is_some() {
        config.max_tokens = args.max_tokens;
    }
    if args.verbose {
        config.verbose = true;
    }
    if args.prompt_file.is_some() {
        config.prompt_file = args.prompt_file.clone();
    }
    if let Some(attempts) = args.max_compile_attempts {
        config.max_compile_attempts = attempts;
    }
    if args.repair_temperature.is_some() {
        config.repair_temperature = args.repair_temperature;
    }
    if let Some(api_base) = &args.api_base {
        config.gateway.api_base = api_base.clone();
    }
    if args.api_key.is_some() {
        config.gateway.api_key = args.api_key.clone();
    }
    if let Some(model) = &args.model {
        config.gateway.model = model.clone();
    }
    if let Some(command) = &args.compiler {
        config.compiler_command = parse_command(command, "--compiler")?;
    }

    config.validate()?;
    Ok(config)
}

/// Reads the description from the flag, the input file, or stdin.
fn read_description(args: &GenerateArgs) -> anyhow::Result<String> {
    let description = if let Some(description) = &args.description {
        description.clone()
    } else if let Some(path) = &args.input_file {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read description from {}", path.display()))?
    } else {
        let stdin = std::io::stdin();
        if stdin.is_terminal() {
            anyhow::bail!(
                "No description given. Use --description, --input-file or pipe it on stdin."
            );
        }
        let mut buf = String::new();
        stdin
            .lock()
            .read_to_string(&mut buf)
            .context("Failed to read description from stdin")?;
        buf
    };

    let description = description.trim().to_string();
    if description.is_empty() {
        anyhow::bail!("Scene description is empty");
    }
    Ok(description)
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let description = read_description(&args)?;
    let catalog = Arc::new(load_catalog(&config)?);

    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let temperature = config.temperature;
    let verbose = config.verbose;
    let model = config.gateway.model.clone();
    let orchestrator =
        StepOrchestrator::from_config(config, catalog)?.with_cancel_signal(signal);

    info!(chars = description.len(), "Generating Scenic program");
    let result = orchestrator
        .run(&ModelInput::new(description), temperature, verbose)
        .await;

    match result {
        Ok(program) => {
            report_success(&args, &model, &program)?;
            Ok(())
        }
        Err(err) => {
            report_failure(&args, &model, &err)?;
            Err(anyhow::Error::new(err).context("Scenic program generation failed"))
        }
    }
}

fn report_success(
    args: &GenerateArgs,
    model: &str,
    program: &AssembledProgram,
) -> anyhow::Result<()> {
    let unmarked: Vec<String> = program
        .unmarked_steps()
        .into_iter()
        .map(str::to_string)
        .collect();
    if !unmarked.is_empty() {
        warn!(steps = ?unmarked, "Some completions had no final-answer marker");
    }

    if let Some(path) = &args.output {
        std::fs::write(path, &program.source)
            .with_context(|| format!("Failed to write program to {}", path.display()))?;
        info!(path = %path.display(), "Program written");
    }

    if args.json {
        let output = GenerationOutput {
            status: "success".to_string(),
            model: model.to_string(),
            program: Some(program.source.clone()),
            compile_attempts: Some(program.compile_attempts),
            repairs: Some(program.repairs),
            total_tokens: Some(program.usage.total_tokens),
            unmarked_steps: unmarked,
            error: None,
        };
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else if args.output.is_none() {
        println!("{}", program.source);
    }

    Ok(())
}

fn report_failure(args: &GenerateArgs, model: &str, err: &PipelineError) -> anyhow::Result<()> {
    if args.json {
        let output = GenerationOutput {
            status: if err.is_cancelled() {
                "cancelled".to_string()
            } else {
                "failed".to_string()
            },
            model: model.to_string(),
            program: None,
            compile_attempts: None,
            repairs: None,
            total_tokens: None,
            unmarked_steps: Vec::new(),
            error: Some(FailureOutput::from(err)),
        };
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    if let Some(step) = err.step() {
        eprintln!("Failed at step: {}", step);
    }
    if let Some(output) = err.last_output() {
        eprintln!("Last output:\n{}", output);
    }
    if let Some(program) = err.program() {
        eprintln!("Last program:\n{}", program);
    }
    Ok(())
}

// ============================================================================
// Check-Prompts Command Implementation
// ============================================================================

fn run_check_prompts_command(args: CheckPromptsArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::default().with_prompt_file(args.prompt_file);
    let catalog = load_catalog(&config)?;

    validate_chain(PIPELINE_STEPS)?;
    verify_catalog(PIPELINE_STEPS, &catalog)
        .context("Prompt catalog does not match the step chain")?;

    for step in PIPELINE_STEPS {
        let placeholders = catalog.placeholders(step.id)?;
        println!("{:<16} {}", step.id, placeholders.join(", "));
    }
    println!(
        "Prompt catalog OK ({} questions)",
        catalog.question_paths().len()
    );
    Ok(())
}
