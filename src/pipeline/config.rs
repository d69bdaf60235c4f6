//! Pipeline configuration for the step orchestrator.
//!
//! This module provides configuration options for one Scenic generation run,
//! including the model gateway, sampling parameters, the compile/repair
//! budget, the external compiler command, and the prompt catalog location.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::compiler::default_compiler_command;
use crate::llm::GatewayConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for one orchestration run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Gateway settings
    /// Endpoint, credentials, model and transport retry policy.
    pub gateway: GatewayConfig,

    // Sampling settings
    /// Temperature for every step query.
    pub temperature: f64,
    /// Upper bound on completion length, if any.
    pub max_tokens: Option<u32>,

    // Repair settings
    /// Total compile attempts, including the first one.
    pub max_compile_attempts: u32,
    /// Temperature for repair queries; `None` keeps `temperature`.
    pub repair_temperature: Option<f64>,

    // Compiler settings
    /// Program and arguments; the program file path is appended.
    pub compiler_command: Vec<String>,
    /// Timeout for one compiler invocation.
    pub compiler_timeout: Duration,

    // Prompt settings
    /// Catalog file to load instead of the bundled one.
    pub prompt_file: Option<PathBuf>,
    /// Log each step's raw completion between BEGIN/END markers.
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),

            temperature: 0.7,
            max_tokens: None,

            max_compile_attempts: 3,
            repair_temperature: None,

            compiler_command: default_compiler_command(),
            compiler_timeout: Duration::from_secs(120),

            prompt_file: None,
            verbose: false,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SCENIC_NL_API_BASE`: OpenAI-compatible endpoint (default: http://localhost:8080/v1)
    /// - `SCENIC_NL_API_KEY`: API key (default: sk-no-key-required)
    /// - `SCENIC_NL_MODEL`: Model name (default: LLama_CPP)
    /// - `SCENIC_NL_REQUEST_TIMEOUT_SECS`: Per-attempt request timeout (default: 300)
    /// - `SCENIC_NL_MAX_REQUEST_ATTEMPTS`: Transport attempts per query (default: 3)
    /// - `SCENIC_NL_TEMPERATURE`: Sampling temperature (default: 0.7)
    /// - `SCENIC_NL_MAX_TOKENS`: Completion token limit (default: unset)
    /// - `SCENIC_NL_MAX_COMPILE_ATTEMPTS`: Compile attempts (default: 3)
    /// - `SCENIC_NL_REPAIR_TEMPERATURE`: Temperature for repair queries (default: unset)
    /// - `SCENIC_NL_COMPILER_COMMAND`: JSON array or whitespace-separated command
    /// - `SCENIC_NL_COMPILER_TIMEOUT_SECS`: Compiler timeout (default: 120)
    /// - `SCENIC_NL_PROMPT_FILE`: Prompt catalog YAML (default: bundled)
    /// - `SCENIC_NL_VERBOSE`: Log raw step completions (default: false)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Gateway settings
        if let Ok(val) = std::env::var("SCENIC_NL_API_BASE") {
            config.gateway.api_base = val;
        }

        if let Ok(val) = std::env::var("SCENIC_NL_API_KEY") {
            config.gateway.api_key = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var("SCENIC_NL_MODEL") {
            config.gateway.model = val;
        }

        if let Ok(val) = std::env::var("SCENIC_NL_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "SCENIC_NL_REQUEST_TIMEOUT_SECS")?;
            config.gateway.request_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("SCENIC_NL_MAX_REQUEST_ATTEMPTS") {
            config.gateway.max_attempts = parse_env_value(&val, "SCENIC_NL_MAX_REQUEST_ATTEMPTS")?;
        }

        // Sampling settings
        if let Ok(val) = std::env::var("SCENIC_NL_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "SCENIC_NL_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("SCENIC_NL_MAX_TOKENS") {
            config.max_tokens = Some(parse_env_value(&val, "SCENIC_NL_MAX_TOKENS")?);
        }

        // Repair settings
        if let Ok(val) = std::env::var("SCENIC_NL_MAX_COMPILE_ATTEMPTS") {
            config.max_compile_attempts = parse_env_value(&val, "SCENIC_NL_MAX_COMPILE_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("SCENIC_NL_REPAIR_TEMPERATURE") {
            config.repair_temperature =
                Some(parse_env_value(&val, "SCENIC_NL_REPAIR_TEMPERATURE")?);
        }

        // Compiler settings
        if let Ok(val) = std::env::var("SCENIC_NL_COMPILER_COMMAND") {
            config.compiler_command = parse_command(&val, "SCENIC_NL_COMPILER_COMMAND")?;
        }

        if let Ok(val) = std::env::var("SCENIC_NL_COMPILER_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "SCENIC_NL_COMPILER_TIMEOUT_SECS")?;
            config.compiler_timeout = Duration::from_secs(secs);
        }

        // Prompt settings
        if let Ok(val) = std::env::var("SCENIC_NL_PROMPT_FILE") {
            config.prompt_file = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("SCENIC_NL_VERBOSE") {
            config.verbose = parse_env_bool(&val, "SCENIC_NL_VERBOSE")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Gateway validation
        if self.gateway.api_base.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_base cannot be empty".to_string(),
            ));
        }

        if self.gateway.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if self.gateway.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.gateway.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_request_attempts must be greater than 0".to_string(),
            ));
        }

        // Sampling validation
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if let Some(repair) = self.repair_temperature {
            if !(0.0..=2.0).contains(&repair) {
                return Err(ConfigError::ValidationFailed(
                    "repair_temperature must be between 0.0 and 2.0".to_string(),
                ));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        // Repair validation
        if self.max_compile_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_compile_attempts must be greater than 0".to_string(),
            ));
        }

        // Compiler validation
        if self
            .compiler_command
            .first()
            .map_or(true, |c| c.trim().is_empty())
        {
            return Err(ConfigError::ValidationFailed(
                "compiler_command cannot be empty".to_string(),
            ));
        }

        if self.compiler_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "compiler_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Temperature used for compiler-error repair queries in a run at `run_temperature`.
    pub fn effective_repair_temperature(&self, run_temperature: f64) -> f64 {
        self.repair_temperature.unwrap_or(run_temperature)
    }

    /// Builder method to set the gateway configuration.
    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }

    /// Builder method to set temperature.
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    /// Builder method to set the completion token limit.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Builder method to set the compile attempt budget.
    pub fn with_max_compile_attempts(mut self, attempts: u32) -> Self {
        self.max_compile_attempts = attempts;
        self
    }

    /// Builder method to set the repair temperature.
    pub fn with_repair_temperature(mut self, temp: Option<f64>) -> Self {
        self.repair_temperature = temp;
        self
    }

    /// Builder method to set the compiler command.
    pub fn with_compiler_command(mut self, command: Vec<String>) -> Self {
        self.compiler_command = command;
        self
    }

    /// Builder method to set the compiler timeout.
    pub fn with_compiler_timeout(mut self, timeout: Duration) -> Self {
        self.compiler_timeout = timeout;
        self
    }

    /// Builder method to set the prompt catalog file.
    pub fn with_prompt_file(mut self, path: Option<PathBuf>) -> Self {
        self.prompt_file = path;
        self
    }

    /// Builder method to enable or disable verbose step output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

/// Parse a command line given as a JSON array or as whitespace-separated words.
pub fn parse_command(value: &str, key: &str) -> Result<Vec<String>, ConfigError> {
    let trimmed = value.trim();
    let command: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a JSON array of strings: {}", e),
        })?
    } else {
        trimmed.split_whitespace().map(str::to_string).collect()
    };

    if command.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "command is empty".to_string(),
        });
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{DEFAULT_API_BASE, DEFAULT_MODEL};

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.gateway.api_base, DEFAULT_API_BASE);
        assert_eq!(config.gateway.model, DEFAULT_MODEL);
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.max_tokens, None);
        assert_eq!(config.max_compile_attempts, 3);
        assert_eq!(config.repair_temperature, None);
        assert_eq!(config.compiler_command, default_compiler_command());
        assert!(config.prompt_file.is_none());
        assert!(!config.verbose);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_gateway(GatewayConfig::new().with_model("qwen"))
            .with_temperature(0.2)
            .with_max_tokens(Some(2048))
            .with_max_compile_attempts(5)
            .with_repair_temperature(Some(0.1))
            .with_compiler_command(vec!["scenic".to_string()])
            .with_compiler_timeout(Duration::from_secs(30))
            .with_prompt_file(Some(PathBuf::from("prompts.yaml")))
            .with_verbose(true);

        assert_eq!(config.gateway.model, "qwen");
        assert!((config.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.max_tokens, Some(2048));
        assert_eq!(config.max_compile_attempts, 5);
        assert_eq!(config.compiler_command, vec!["scenic".to_string()]);
        assert_eq!(config.compiler_timeout, Duration::from_secs(30));
        assert_eq!(config.prompt_file, Some(PathBuf::from("prompts.yaml")));
        assert!(config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_repair_temperature_falls_back() {
        let config = PipelineConfig::default().with_temperature(0.4);
        assert!((config.effective_repair_temperature(0.9) - 0.9).abs() < f64::EPSILON);

        let config = config.with_repair_temperature(Some(0.0));
        assert!(config.effective_repair_temperature(0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_temperature() {
        let config = PipelineConfig::default().with_temperature(3.0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("temperature"));
    }

    #[test]
    fn test_validation_invalid_repair_temperature() {
        let config = PipelineConfig::default().with_repair_temperature(Some(-0.5));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("repair_temperature"));
    }

    #[test]
    fn test_validation_zero_compile_attempts() {
        let config = PipelineConfig::default().with_max_compile_attempts(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_compile_attempts"));
    }

    #[test]
    fn test_validation_zero_max_tokens() {
        let config = PipelineConfig::default().with_max_tokens(Some(0));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_tokens"));
    }

    #[test]
    fn test_validation_empty_compiler_command() {
        let config = PipelineConfig::default().with_compiler_command(Vec::new());
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("compiler_command"));
    }

    #[test]
    fn test_validation_empty_model() {
        let config =
            PipelineConfig::default().with_gateway(GatewayConfig::new().with_model(""));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("model"));
    }

    #[test]
    fn test_validation_zero_compiler_timeout() {
        let config = PipelineConfig::default().with_compiler_timeout(Duration::ZERO);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("compiler_timeout"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "TEST").unwrap());
        assert!(parse_env_bool("TRUE", "TEST").unwrap());
        assert!(parse_env_bool("1", "TEST").unwrap());
        assert!(parse_env_bool("yes", "TEST").unwrap());
        assert!(parse_env_bool("on", "TEST").unwrap());
        assert!(!parse_env_bool("false", "TEST").unwrap());
        assert!(!parse_env_bool("0", "TEST").unwrap());
        assert!(!parse_env_bool("off", "TEST").unwrap());
        assert!(parse_env_bool("maybe", "TEST").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let val: u32 = parse_env_value("42", "TEST").unwrap();
        assert_eq!(val, 42);

        let val: f64 = parse_env_value(" 0.25 ", "TEST").unwrap();
        assert!((val - 0.25).abs() < f64::EPSILON);

        let result: Result<u32, _> = parse_env_value("not_a_number", "TEST");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_command_words() {
        let command = parse_command("scenic --check", "TEST").unwrap();
        assert_eq!(command, vec!["scenic".to_string(), "--check".to_string()]);
    }

    #[test]
    fn test_parse_command_json() {
        let command = parse_command(
            r#"["python3", "-c", "import sys, scenic; scenic.scenarioFromFile(sys.argv[1])"]"#,
            "TEST",
        )
        .unwrap();
        assert_eq!(command, default_compiler_command());
    }

    #[test]
    fn test_parse_command_rejects_empty_and_bad_json() {
        assert!(parse_command("   ", "TEST").is_err());
        assert!(parse_command("[]", "TEST").is_err());
        assert!(parse_command("[\"unterminated", "TEST").is_err());
    }
}
