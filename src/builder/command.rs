//! The external command boundary.
//!
//! Every tool invocation (compile, archive, link, post-link) goes through a
//! `CommandRunner`. The runner owns execution and any output-staleness
//! short-circuiting; the engine never inspects timestamps itself.

use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

use crate::util::process::ProcessBuilder;

/// An invoked tool failed (could not be spawned, or exited non-zero).
#[derive(Debug, Clone, Error)]
#[error("command `{command}` failed: {message}")]
pub struct CommandError {
    pub command: String,
    pub message: String,
}

/// A command to execute: program, arguments, environment, and an optional
/// human-readable echo string for logging.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            echo: None,
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the echo string shown when the command runs.
    pub fn echo(mut self, echo: impl Into<String>) -> Self {
        self.echo = Some(echo.into());
        self
    }

    /// Render the full command line for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Executes commands on behalf of rules.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<(), CommandError>;
}

/// Runs commands as real subprocesses.
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        ProcessRunner
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        ProcessRunner::new()
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<(), CommandError> {
        if let Some(ref echo) = spec.echo {
            tracing::info!("{}", echo);
        }
        tracing::debug!("{}", spec.display_command());

        let mut cmd = ProcessBuilder::new(&spec.program).args(&spec.args);
        for (key, value) in &spec.env {
            cmd = cmd.env(key, value);
        }

        let output = cmd.exec().map_err(|e| CommandError {
            command: spec.display_command(),
            message: format!("{:#}", e),
        })?;

        // Tools like `size` report through stdout.
        if !output.stdout.is_empty() {
            print!("{}", String::from_utf8_lossy(&output.stdout));
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CommandError {
                command: spec.display_command(),
                message: format!(
                    "exit code {:?}\n{}",
                    output.status.code(),
                    stderr.trim_end()
                ),
            });
        }

        Ok(())
    }
}

/// Records commands without executing them.
///
/// Backs `build --plan` and the engine tests; can inject a failure when a
/// command mentions a given pattern.
pub struct RecordingRunner {
    commands: Mutex<Vec<CommandSpec>>,
    fail_matching: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        RecordingRunner {
            commands: Mutex::new(Vec::new()),
            fail_matching: None,
        }
    }

    /// Fail any command whose program or args contain `pattern`.
    pub fn failing_on(pattern: impl Into<String>) -> Self {
        RecordingRunner {
            commands: Mutex::new(Vec::new()),
            fail_matching: Some(pattern.into()),
        }
    }

    /// Everything recorded so far, in execution order.
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().unwrap().clone()
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        RecordingRunner::new()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<(), CommandError> {
        self.commands.lock().unwrap().push(spec.clone());

        if let Some(ref pattern) = self.fail_matching {
            if spec.program.contains(pattern.as_str())
                || spec.args.iter().any(|a| a.contains(pattern.as_str()))
            {
                return Err(CommandError {
                    command: spec.display_command(),
                    message: "injected failure".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let spec = CommandSpec::new("gcc")
            .arg("-c")
            .args(["main.c", "-o", "main.o"])
            .echo("compile main.o");

        assert_eq!(spec.display_command(), "gcc -c main.c -o main.o");
        assert_eq!(spec.echo.as_deref(), Some("compile main.o"));
    }

    #[test]
    fn test_recording_runner_records_in_order() {
        let runner = RecordingRunner::new();
        runner.run(&CommandSpec::new("gcc").arg("-c")).unwrap();
        runner.run(&CommandSpec::new("ar").arg("rc")).unwrap();

        let commands = runner.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].program, "gcc");
        assert_eq!(commands[1].program, "ar");
    }

    #[test]
    fn test_recording_runner_injected_failure() {
        let runner = RecordingRunner::failing_on("ar");
        assert!(runner.run(&CommandSpec::new("gcc")).is_ok());
        assert!(runner.run(&CommandSpec::new("ar")).is_err());
        // The failing command is still recorded.
        assert_eq!(runner.commands().len(), 2);
    }

    #[test]
    fn test_process_runner_reports_failure() {
        let runner = ProcessRunner::new();
        let err = runner
            .run(&CommandSpec::new("slipway-no-such-tool").arg("x"))
            .unwrap_err();
        assert!(err.command.contains("slipway-no-such-tool"));
    }
}
