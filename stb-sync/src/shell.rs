//! Subprocess execution for workflow steps.
//!
//! Every command runs with an explicit working directory; the process-wide
//! current directory is never changed. [`WorkdirScope`] binds a group of
//! steps to one service directory for as long as it is alive.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A program invocation: program, arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    interactive: bool,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            interactive: false,
        }
    }

    /// Split a fixed command line on whitespace, e.g. `"git pull"`.
    /// Not a shell parser: quoting is not interpreted.
    pub fn from_words(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let program = words.next().unwrap_or_default();
        Self::new(program).args(words)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Extra environment variable for the child. Values are never logged.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((name.into(), value.into()));
        self
    }

    /// Let the child inherit stdout/stderr instead of capturing them.
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Human-readable command line (without environment).
    pub fn line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line())
    }
}

// ---------------------------------------------------------------------------
// Output and errors
// ---------------------------------------------------------------------------

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn `{command}` in {dir}: {source}")]
    Spawn {
        command: String,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed in {dir} (exit {code}): {stderr}")]
    Failed {
        command: String,
        dir: PathBuf,
        /// `-1` when the child was killed by a signal.
        code: i32,
        stderr: String,
    },

    #[error("working directory {dir} is not accessible: {source}")]
    Workdir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

/// Runs commands in a working directory.
pub trait Shell {
    /// Run `command` in `dir` and return its output whatever the exit status.
    /// Fails only when the command cannot be started.
    fn exec(&self, dir: &Path, command: &ShellCommand) -> Result<CommandOutput, ShellError>;

    /// Like [`Shell::exec`], but a non-zero exit is a [`ShellError::Failed`].
    fn run(&self, dir: &Path, command: &ShellCommand) -> Result<CommandOutput, ShellError> {
        let output = self.exec(dir, command)?;
        if output.success() {
            return Ok(output);
        }
        Err(ShellError::Failed {
            command: command.line(),
            dir: dir.to_path_buf(),
            code: output.code.unwrap_or(-1),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

impl<S: Shell + ?Sized> Shell for &S {
    fn exec(&self, dir: &Path, command: &ShellCommand) -> Result<CommandOutput, ShellError> {
        (**self).exec(dir, command)
    }
}

/// Spawns real processes via `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl Shell for SystemShell {
    fn exec(&self, dir: &Path, command: &ShellCommand) -> Result<CommandOutput, ShellError> {
        tracing::info!("{}$ {}", dir.display(), command);

        let mut cmd = Command::new(command.program());
        cmd.args(command.arguments())
            .envs(command.envs().iter().map(|(k, v)| (k, v)))
            .current_dir(dir)
            .stdin(Stdio::null());

        let spawn_err = |source| ShellError::Spawn {
            command: command.line(),
            dir: dir.to_path_buf(),
            source,
        };

        if command.is_interactive() {
            let status = cmd.status().map_err(spawn_err)?;
            return Ok(CommandOutput {
                code: status.code(),
                ..CommandOutput::default()
            });
        }

        let output = cmd.output().map_err(spawn_err)?;
        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            "`{}` exited with {:?} ({} bytes stdout)",
            command,
            result.code,
            result.stdout.len()
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Scoped working directory
// ---------------------------------------------------------------------------

/// All shell steps for one service directory.
///
/// Acquired with [`WorkdirScope::enter`] and released on drop, on success
/// and on error alike. Commands issued through the scope always run in its
/// directory.
pub struct WorkdirScope<'a, S: Shell + ?Sized> {
    shell: &'a S,
    dir: PathBuf,
}

impl<'a, S: Shell + ?Sized> WorkdirScope<'a, S> {
    /// Enter `dir`, which must be an existing directory.
    pub fn enter(shell: &'a S, dir: &Path) -> Result<Self, ShellError> {
        let metadata = std::fs::metadata(dir).map_err(|source| ShellError::Workdir {
            dir: dir.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ShellError::Workdir {
                dir: dir.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            });
        }
        tracing::info!("cd {}", dir.display());
        Ok(Self {
            shell,
            dir: dir.to_path_buf(),
        })
    }

    /// Run a command; non-zero exit is an error.
    pub fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ShellError> {
        self.shell.run(&self.dir, command)
    }

    /// Run a command and hand back its output whatever the exit status.
    pub fn exec(&self, command: &ShellCommand) -> Result<CommandOutput, ShellError> {
        self.shell.exec(&self.dir, command)
    }
}

impl<S: Shell + ?Sized> Drop for WorkdirScope<'_, S> {
    fn drop(&mut self) {
        tracing::debug!("leaving {}", self.dir.display());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
