//! External Scenic compiler harness.
//!
//! The compiler is an opaque validator: it receives program text and either
//! accepts it or returns a diagnostic. [`ScenicCompiler`] writes the program
//! to a temporary `.scenic` file and runs a configurable command with the
//! file path appended as the last argument.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::CompilerError;

/// Result of one compilation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Success,
    Failed { diagnostic: String },
}

/// Something that can validate a Scenic program.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compiles `source`. `Err` means the compiler itself could not run.
    async fn compile(&self, source: &str) -> Result<CompileOutcome, CompilerError>;
}

/// Default command: load the file through the Scenic Python package.
pub fn default_compiler_command() -> Vec<String> {
    vec![
        "python3".to_string(),
        "-c".to_string(),
        "import sys, scenic; scenic.scenarioFromFile(sys.argv[1])".to_string(),
    ]
}

/// Runs an external command to compile Scenic programs.
#[derive(Debug, Clone)]
pub struct ScenicCompiler {
    command: Vec<String>,
    timeout: Duration,
}

impl ScenicCompiler {
    /// Creates a compiler from a command line (program followed by arguments).
    pub fn new(command: Vec<String>, timeout: Duration) -> Result<Self, CompilerError> {
        if command.first().map_or(true, |c| c.trim().is_empty()) {
            return Err(CompilerError::EmptyCommand);
        }
        Ok(Self { command, timeout })
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

#[async_trait]
impl Compiler for ScenicCompiler {
    async fn compile(&self, source: &str) -> Result<CompileOutcome, CompilerError> {
        let mut file = tempfile::Builder::new()
            .prefix("scenic-nl-")
            .suffix(".scenic")
            .tempfile()?;
        file.write_all(source.as_bytes())?;
        file.flush()?;

        let program = &self.command[0];
        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %program, path = %file.path().display(), "Running Scenic compiler");

        let child = cmd.spawn().map_err(|source| CompilerError::Spawn {
            command: program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(CompilerError::Timeout(self.timeout)),
        };

        if output.status.success() {
            return Ok(CompileOutcome::Success);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let diagnostic = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            format!(
                "compiler exited with status {}",
                output.status.code().unwrap_or(-1)
            )
        };

        Ok(CompileOutcome::Failed { diagnostic })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = ScenicCompiler::new(Vec::new(), Duration::from_secs(1)).expect_err("empty");
        assert!(matches!(err, CompilerError::EmptyCommand));
        let err = ScenicCompiler::new(vec!["  ".to_string()], Duration::from_secs(1))
            .expect_err("blank");
        assert!(matches!(err, CompilerError::EmptyCommand));
    }

    #[test]
    fn test_default_command() {
        let command = default_compiler_command();
        assert_eq!(command[0], "python3");
        assert!(command[2].contains("scenarioFromFile"));
    }

    #[tokio::test]
    async fn test_success_sees_program_file() {
        // $0 is the appended file path
        let compiler = ScenicCompiler::new(
            sh(r#"grep -q 'CAR = "car"' "$0""#),
            Duration::from_secs(10),
        )
        .expect("compiler");
        let outcome = compiler.compile("CAR = \"car\"\n").await.expect("runs");
        assert_eq!(outcome, CompileOutcome::Success);
    }

    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let compiler = ScenicCompiler::new(
            sh("echo 'ParseError: line 3' >&2; exit 1"),
            Duration::from_secs(10),
        )
        .expect("compiler");
        let outcome = compiler.compile("garbage").await.expect("runs");
        assert_eq!(
            outcome,
            CompileOutcome::Failed {
                diagnostic: "ParseError: line 3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_failure_without_output_reports_status() {
        let compiler =
            ScenicCompiler::new(sh("exit 4"), Duration::from_secs(10)).expect("compiler");
        match compiler.compile("x").await.expect("runs") {
            CompileOutcome::Failed { diagnostic } => assert!(diagnostic.contains('4')),
            CompileOutcome::Success => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let compiler = ScenicCompiler::new(
            vec!["scenic-nl-no-such-binary".to_string()],
            Duration::from_secs(10),
        )
        .expect("compiler");
        let err = compiler.compile("x").await.expect_err("cannot spawn");
        assert!(matches!(err, CompilerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let compiler =
            ScenicCompiler::new(sh("sleep 5"), Duration::from_millis(100)).expect("compiler");
        let err = compiler.compile("x").await.expect_err("times out");
        assert!(matches!(err, CompilerError::Timeout(_)));
    }
}
