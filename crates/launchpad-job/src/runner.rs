//! Local execution of formatted command lines

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs a complete shell command line and captures its output
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    async fn run(&self, command_line: &str) -> std::io::Result<CommandOutput>;
}

/// Runs command lines through `bash -c`
#[derive(Clone, Debug, Default)]
pub struct ShellRunner;

#[async_trait]
impl RemoteRunner for ShellRunner {
    async fn run(&self, command_line: &str) -> std::io::Result<CommandOutput> {
        debug!(command = %command_line, "running command");
        let output = Command::new("bash")
            .arg("-c")
            .arg(command_line)
            .output()
            .await?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_runner_captures_output_and_status() {
        let output = ShellRunner
            .run("echo out; echo err >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn shell_runner_reports_success() {
        let output = ShellRunner.run("true").await.unwrap();
        assert!(output.success());
    }
}
