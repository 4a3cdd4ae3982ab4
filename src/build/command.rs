//! External process invocation for the build pipeline.
//!
//! Every pipeline step is described as a [`StepCommand`] and executed through
//! a [`CommandRunner`]. The production runner spawns real processes; tests
//! substitute a recording runner so the pipeline can be exercised without
//! `git`, `dch` or `debuild` installed.

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A single external command: program, arguments, working directory and the
/// extra environment it runs with.
///
/// The environment is applied to the child only; the server's own
/// environment is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl StepCommand {
    pub fn new(program: impl Into<String>, workdir: impl AsRef<Path>) -> Self {
        StepCommand {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.as_ref().to_path_buf(),
            env: Vec::new(),
        }
    }

    /// Create a git command that never prompts for credentials.
    pub fn git(workdir: impl AsRef<Path>) -> Self {
        StepCommand::new("git", workdir).env("GIT_TERMINAL_PROMPT", "0")
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Looks up an environment override by name.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for StepCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Stdout and stderr interleaved in the order the child wrote them.
    pub output: Vec<u8>,
}

impl CommandOutput {
    pub fn success(output: impl Into<Vec<u8>>) -> Self {
        CommandOutput {
            code: Some(0),
            output: output.into(),
        }
    }

    pub fn failure(code: i32, output: impl Into<Vec<u8>>) -> Self {
        CommandOutput {
            code: Some(code),
            output: output.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human-readable exit status for logs and error messages.
    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "termination by signal".to_string(),
        }
    }
}

/// Executes pipeline commands.
///
/// Implementations block until the command has finished; there is no timeout.
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion and capture its output.
    ///
    /// An `Err` means the process could not be started at all. A process
    /// that starts and exits non-zero is an `Ok` with a failing code.
    fn run(&self, command: &StepCommand) -> io::Result<CommandOutput>;
}

/// Runs commands as real child processes.
///
/// Stdout and stderr share one pipe, so the captured output keeps the order
/// in which the child wrote it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &StepCommand) -> io::Result<CommandOutput> {
        let (mut reader, writer) = io::pipe()?;

        // The Command keeps its copies of the write end; it must be dropped
        // before reading or the read never sees EOF.
        let mut child = {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .current_dir(&command.workdir)
                .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer);
            cmd.spawn()?
        };

        let mut output = Vec::new();
        let read = reader.read_to_end(&mut output);
        let status = child.wait()?;
        read?;

        Ok(CommandOutput {
            code: status.code(),
            output,
        })
    }
}
