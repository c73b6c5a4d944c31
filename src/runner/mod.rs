//! Launching the external program
//!
//! One [`Invocation`] binds a sweep value and its position to the command
//! template. A [`Launcher`] turns an invocation into a [`CapturedOutput`];
//! [`ProcessRunner`] is the real implementation backed by OS processes.

mod batch;
mod process;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::common::{Error, Result};
use crate::sweep::canonical;

pub use batch::{
    read_input_file, read_output_file, write_input_file, BatchFiles, BatchOutcome, BatchRunner,
    INPUT_HEADER_LINES,
};
pub use process::ProcessRunner;

/// How the program and its argument are handed to the OS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandMode {
    /// Program and argument are passed as discrete argv tokens. No shell.
    #[default]
    Argv,
    /// Program and argument are joined into one string and run by `sh -c`.
    ///
    /// UNSAFE with untrusted values: shell metacharacters in any part of
    /// the string are interpreted. Only kept for call sites that depend on
    /// shell behavior.
    Shell,
}

/// The command used to launch the external program
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    /// Executable to run
    pub program: PathBuf,
    /// Fixed arguments placed before the sweep value
    pub args: Vec<String>,
    /// Argument passing mode
    pub mode: CommandMode,
    /// Working directory for the child, inherited when unset
    pub working_dir: Option<PathBuf>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            mode: CommandMode::Argv,
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_mode(mut self, mode: CommandMode) -> Self {
        if mode == CommandMode::Shell {
            tracing::warn!(
                program = %self.program.display(),
                "Shell-string mode enabled; sweep values are interpreted by the shell"
            );
        }
        self.mode = mode;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Resolve a bare program name through `PATH`
    ///
    /// Names containing a path separator, or naming a file that exists
    /// relative to the working directory, are used as they are.
    pub fn resolve(mut self) -> Result<Self> {
        let has_separator = self.program.components().count() > 1;
        let local = match &self.working_dir {
            Some(dir) => dir.join(&self.program),
            None => self.program.clone(),
        };
        if has_separator || local.is_file() {
            return Ok(self);
        }
        self.program = which::which(&self.program).map_err(|e| {
            Error::launch(&self.program.display().to_string(), format!("not found in PATH ({e})"))
        })?;
        Ok(self)
    }

    /// Full command line as text, for logs and shell mode
    pub fn command_line(&self, argument: Option<&str>) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        if let Some(arg) = argument {
            parts.push(arg.to_string());
        }
        parts.join(" ")
    }

    /// Build the OS command with piped output and kill-on-drop
    pub(crate) fn build(&self, argument: Option<&str>) -> Command {
        let mut cmd = match self.mode {
            CommandMode::Argv => {
                let mut cmd = Command::new(&self.program);
                cmd.args(&self.args);
                if let Some(arg) = argument {
                    cmd.arg(arg);
                }
                cmd
            }
            CommandMode::Shell => shell_command(&self.command_line(argument)),
        };

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    pub fn program_path(&self) -> &Path {
        &self.program
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

/// One launch of the external program for one sweep value
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Position within the sweep
    pub index: usize,
    /// The value sent to the program
    pub value: f64,
    /// Command used for the launch
    pub template: Arc<CommandTemplate>,
}

impl Invocation {
    pub fn new(index: usize, value: f64, template: Arc<CommandTemplate>) -> Self {
        Self {
            index,
            value,
            template,
        }
    }

    /// The value as passed on the command line
    pub fn argument(&self) -> String {
        canonical(self.value)
    }
}

/// Text and exit status produced by one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CapturedOutput {
    /// Captured output of a successful run, mostly for tests and fakes
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    pub(crate) fn from_output(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
        }
    }
}

/// Something that can carry out an invocation
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch, wait for exit, and capture output
    ///
    /// A non-zero exit is reported on the returned output. `deadline`
    /// bounds the wait; on expiry the process is killed and
    /// [`Error::Timeout`] is returned.
    async fn launch(
        &self,
        invocation: &Invocation,
        deadline: Option<Duration>,
    ) -> Result<CapturedOutput>;
}
