//! External command execution
//!
//! Every package-manager, pip and service-manager call goes through
//! [`CommandRunner`], so steps can be exercised against a scripted fake.

use std::io;
use std::process::{Command, Output, Stdio};

/// Output from an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Most useful failure text: stderr, or stdout when stderr is empty
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr_str();
        if stderr.trim().is_empty() {
            self.stdout_str().trim().to_string()
        } else {
            stderr.trim().to_string()
        }
    }
}

/// Runs external programs
///
/// An `Err` means the program could not be spawned at all. A program that
/// ran and exited non-zero is `Ok` with `success == false`.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Runs commands on the real host
///
/// The locale is pinned to `C` so error classification can match on the
/// tools' English messages, and apt is kept non-interactive.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        log::debug!("Running: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            log::debug!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_prefers_stderr() {
        let out = CommandOutput {
            stdout: b"out\n".to_vec(),
            stderr: b"  err\n".to_vec(),
            success: false,
        };
        assert_eq!(out.failure_message(), "err");

        let out = CommandOutput {
            stdout: b"only stdout\n".to_vec(),
            stderr: Vec::new(),
            success: false,
        };
        assert_eq!(out.failure_message(), "only stdout");
    }

    #[test]
    fn test_system_runner_reports_exit_status() {
        let ok = SystemRunner.run("true", &[]).unwrap();
        assert!(ok.success);

        let failed = SystemRunner.run("false", &[]).unwrap();
        assert!(!failed.success);
    }

    #[test]
    fn test_system_runner_spawn_failure_is_err() {
        let err = SystemRunner
            .run("definitely-not-a-real-binary-xyz", &[])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
