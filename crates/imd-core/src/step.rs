//! The "run external step" primitive.
//!
//! Every external tool the installer drives (git, autogen, configure, make,
//! `install_name_tool`) is described as a [`Step`] and executed by a
//! [`StepRunner`]. Steps inherit the parent environment and layer an
//! [`EnvOverlay`] on top; the parent process environment itself is never
//! modified.
//!
//! A step that exits non-zero is an error unless it was marked with
//! [`Step::allow_failure`]. There is no retry and no timeout.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Separator for colon-joined search paths (`PKG_CONFIG_PATH`, `CPATH`, ...).
///
/// MSYS2 shells translate colon lists as well, so this is the same on every
/// supported platform.
pub const SEARCH_PATH_SEPARATOR: &str = ":";

/// Number of log lines shown when a logged step fails.
const FAILURE_TAIL_LINES: usize = 20;

/// Environment variables layered on top of the inherited environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    /// An empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a variable to a colon-joined list of paths.
    pub fn set_search_path<P: AsRef<Path>>(&mut self, key: &str, paths: &[P]) -> &mut Self {
        let joined = paths
            .iter()
            .map(|p| p.as_ref().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(SEARCH_PATH_SEPARATOR);
        self.set(key, joined)
    }

    /// Look up a variable in the overlay (not the inherited environment).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate over overlay entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the overlay sets nothing.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Program name or path (`./autogen.sh`, `make`, ...).
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Working directory; inherits the parent's when `None`.
    pub cwd: Option<PathBuf>,
    /// Variables added to the inherited environment.
    pub env: EnvOverlay,
    /// Treat a non-zero exit as a soft failure.
    pub allow_failure: bool,
    /// Append output here instead of streaming it to the terminal.
    pub log: Option<PathBuf>,
}

impl Step {
    /// A step running `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: EnvOverlay::default(),
            allow_failure: false,
            log: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run inside `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Use `env` as the environment overlay.
    pub fn env(mut self, env: &EnvOverlay) -> Self {
        self.env = env.clone();
        self
    }

    /// Tolerate a non-zero exit status.
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    /// Send output to `path` (appending).
    pub fn log_to(mut self, path: Option<PathBuf>) -> Self {
        self.log = path;
        self
    }

    /// The command as it would be typed in a shell.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

fn shell_quote(word: &str) -> String {
    if word.is_empty() || word.chars().any(char::is_whitespace) {
        format!("'{}'", word.replace('\'', r"'\''"))
    } else {
        word.to_string()
    }
}

/// How a step finished when it did not return an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Exit status zero.
    Succeeded,
    /// Non-zero exit on a step marked [`Step::allow_failure`].
    FailedAllowed {
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
    },
}

/// Errors produced while running a [`Step`].
#[derive(Error, Debug)]
pub enum StepError {
    /// The program could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The program ran and exited non-zero.
    #[error("`{command}` failed with {}", describe_exit(.code))]
    Failed {
        /// Full command line.
        command: String,
        /// Exit code, if any.
        code: Option<i32>,
        /// Log file the output went to.
        log: Option<PathBuf>,
        /// Last lines of that log.
        tail: Option<String>,
    },

    /// The build log could not be opened.
    #[error("failed to open build log {path}: {source}")]
    Log {
        /// Log path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Executes [`Step`]s.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run one step to completion.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Failed`] on a non-zero exit (unless the step
    /// allows failure) or [`StepError::Spawn`] if the program cannot start.
    async fn run(&self, step: &Step) -> Result<StepOutcome, StepError>;
}

/// Runs steps as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    verbose: bool,
}

impl ProcessRunner {
    /// With `verbose`, child output always streams to the terminal and
    /// [`Step::log`] is ignored.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn command(step: &Step) -> tokio::process::Command {
        let program = resolve_program(step);

        // MSYS2 scripts have no PE header; hand them to the POSIX shell.
        let mut cmd = if cfg!(windows) && step.program.starts_with("./") {
            let mut c = tokio::process::Command::new("sh");
            c.arg(&program);
            c
        } else {
            tokio::process::Command::new(&program)
        };

        cmd.args(&step.args);
        if let Some(dir) = &step.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(step.env.iter());
        cmd
    }

    fn open_log(path: &Path, command: &str) -> Result<std::fs::File, StepError> {
        use std::io::Write;

        let open = || -> std::io::Result<std::fs::File> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(file, "$ {command}")?;
            Ok(file)
        };

        open().map_err(|source| StepError::Log {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl StepRunner for ProcessRunner {
    async fn run(&self, step: &Step) -> Result<StepOutcome, StepError> {
        let command = step.command_line();
        info!(command = %command, cwd = ?step.cwd, "running step");
        if !step.env.is_empty() {
            debug!(env = ?step.env, "environment overlay");
        }

        let mut cmd = Self::command(step);
        let log = if self.verbose { None } else { step.log.as_deref() };

        if let Some(path) = log {
            let file = Self::open_log(path, &command)?;
            let stderr = file.try_clone().map_err(|source| StepError::Log {
                path: path.to_path_buf(),
                source,
            })?;
            cmd.stdout(Stdio::from(file)).stderr(Stdio::from(stderr));
        }

        let status = cmd.status().await.map_err(|source| StepError::Spawn {
            program: step.program.clone(),
            source,
        })?;

        if status.success() {
            return Ok(StepOutcome::Succeeded);
        }

        if step.allow_failure {
            warn!(command = %command, code = ?status.code(), "step failed, continuing");
            return Ok(StepOutcome::FailedAllowed {
                code: status.code(),
            });
        }

        let tail = log.and_then(|p| read_last_lines(p, FAILURE_TAIL_LINES).ok());
        Err(StepError::Failed {
            command,
            code: status.code(),
            log: log.map(Path::to_path_buf),
            tail,
        })
    }
}

/// `./script` style programs are resolved against the step's working
/// directory rather than the parent's.
fn resolve_program(step: &Step) -> PathBuf {
    match (&step.cwd, step.program.strip_prefix("./")) {
        (Some(dir), Some(rest)) => dir.join(rest),
        _ => PathBuf::from(&step.program),
    }
}

/// Read the last N lines from a file efficiently.
///
/// Instead of loading the entire file, we seek to near the end and read a fixed-size
/// tail buffer. Build logs of a full OpenSSL compile run to megabytes.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    // Read at most 16KB from the end (enough for ~400 lines at 40 chars each)
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let buffer = String::from_utf8_lossy(&bytes);
    let buffer: &str = &buffer;

    // If we seeked mid-file, skip the first (partial) line
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(buffer, |idx| &buffer[idx + 1..])
    } else {
        buffer
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}
