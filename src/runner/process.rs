//! Process-backed launcher

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;

use crate::common::{Error, Result};

use super::{CapturedOutput, CommandTemplate, Invocation, Launcher};

/// Runs each invocation as a fresh OS process
///
/// Holds no state between calls; everything about the launch comes from the
/// invocation's template.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Launch `template` with an optional positional argument and capture it
    pub async fn run(
        &self,
        template: &CommandTemplate,
        argument: Option<&str>,
        deadline: Option<Duration>,
        index: usize,
    ) -> Result<CapturedOutput> {
        let started = Instant::now();
        let child = template
            .build(argument)
            .spawn()
            .map_err(|e| Error::launch(&template.program_name(), e))?;

        tracing::debug!(
            index,
            pid = ?child.id(),
            command = %template.command_line(argument),
            "Launched external program"
        );

        // Dropping the wait future drops the child, which kills it
        let output = match deadline {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    tracing::warn!(index, limit_ms = limit.as_millis() as u64, "Invocation timed out");
                    return Err(Error::Timeout {
                        index,
                        secs: limit.as_secs_f64(),
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let captured = CapturedOutput::from_output(output);
        tracing::debug!(
            index,
            exit_code = ?captured.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "External program exited"
        );
        Ok(captured)
    }
}

#[async_trait]
impl Launcher for ProcessRunner {
    async fn launch(
        &self,
        invocation: &Invocation,
        deadline: Option<Duration>,
    ) -> Result<CapturedOutput> {
        let argument = invocation.argument();
        self.run(
            &invocation.template,
            Some(&argument),
            deadline,
            invocation.index,
        )
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::runner::CommandMode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_argv_mode_passes_value_verbatim() {
        let template = Arc::new(CommandTemplate::new("echo").resolve().unwrap());
        let invocation = Invocation::new(0, 0.5, template);
        let output = ProcessRunner::new().launch(&invocation, None).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "0.5");
    }

    #[tokio::test]
    async fn test_shell_mode_interprets_the_line() {
        let template = CommandTemplate::new("echo")
            .with_args(vec!["radius".to_string()])
            .with_mode(CommandMode::Shell);
        let output = ProcessRunner::new()
            .run(&template, Some("2; echo area 12.566"), None, 0)
            .await
            .unwrap();
        assert_eq!(output.stdout, "radius 2\narea 12.566\n");
    }

    #[tokio::test]
    async fn test_argv_mode_does_not_interpret_metacharacters() {
        let template = CommandTemplate::new("echo").resolve().unwrap();
        let output = ProcessRunner::new()
            .run(&template, Some("2; echo pwned"), None, 0)
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "2; echo pwned");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported_not_raised() {
        let template = CommandTemplate::new("false").resolve().unwrap();
        let output = ProcessRunner::new().run(&template, None, None, 0).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let template = CommandTemplate::new("./definitely/not/here");
        let result = ProcessRunner::new().run(&template, Some("1"), None, 0).await;
        assert!(matches!(result, Err(Error::Launch { .. })));
    }

    #[tokio::test]
    async fn test_deadline_kills_process() {
        let template = CommandTemplate::new("sleep").resolve().unwrap();
        let started = Instant::now();
        let result = ProcessRunner::new()
            .run(&template, Some("5"), Some(Duration::from_millis(100)), 3)
            .await;
        assert!(matches!(result, Err(Error::Timeout { index: 3, .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
