use std::process::Command;
use thiserror::Error;

/// Invocation/environment failure: the command never ran to completion,
/// so nothing is known about the outcome. Distinct from a command that
/// ran and reported a non-zero exit code.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to invoke {command}: {source}")]
    Invocation {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} terminated by signal")]
    Signalled { command: String },
}

/// Result of a completed privileged command. The exit code is the sole
/// success signal.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Capability for running privileged remediation commands.
///
/// The response engine only ever talks to this trait, so tests can
/// substitute a fake executor and assert on the exit-code-to-status
/// mapping without touching the OS.
pub trait PrivilegedCommandExecutor: Send {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput, ExecError>;
}

/// Executor that spawns real processes, escalating through sudo.
///
/// The privilege-escalation mechanism lives here, not in the engine;
/// the engine passes plain argv like `["iptables", ...]`.
pub struct SystemExecutor {
    use_sudo: bool,
}

impl SystemExecutor {
    pub fn new() -> Self {
        SystemExecutor { use_sudo: true }
    }

    /// Skip the sudo prefix, for environments already running as root.
    pub fn without_sudo() -> Self {
        SystemExecutor { use_sudo: false }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivilegedCommandExecutor for SystemExecutor {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput, ExecError> {
        let command_name = argv.first().copied().unwrap_or("").to_string();

        let mut command = if self.use_sudo {
            let mut c = Command::new("sudo");
            c.args(argv);
            c
        } else {
            let mut c = Command::new(argv[0]);
            c.args(&argv[1..]);
            c
        };

        let output = command.output().map_err(|source| ExecError::Invocation {
            command: command_name.clone(),
            source,
        })?;

        let exit_code = output.status.code().ok_or(ExecError::Signalled {
            command: command_name,
        })?;

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_real_command_and_captures_exit_code() {
        let executor = SystemExecutor::without_sudo();
        let output = executor.run(&["true"]).unwrap();
        assert_eq!(output.exit_code, 0);
    }

    #[test]
    fn nonzero_exit_code_is_not_an_error() {
        let executor = SystemExecutor::without_sudo();
        let output = executor.run(&["false"]).unwrap();
        assert_ne!(output.exit_code, 0);
    }

    #[test]
    fn missing_binary_is_an_invocation_error() {
        let executor = SystemExecutor::without_sudo();
        let result = executor.run(&["definitely-not-a-real-binary-4242"]);
        assert!(matches!(result, Err(ExecError::Invocation { .. })));
    }
}
