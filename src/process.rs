//! External command execution.
//!
//! [`Cmd`] is a small builder over [`std::process::Command`] that captures
//! output, turns non-zero exits into errors (unless told otherwise) and can
//! bound how long a child may run.
//!
//! Programs are looked up in the directory of the running executable before
//! `$PATH`, so helpers shipped next to `appimagetool` win over host copies.
//!
//! ```rust,ignore
//! use appimagetool::process::Cmd;
//!
//! let result = Cmd::new("mksquashfs")
//!     .arg("-version")
//!     .allow_fail()
//!     .run()?;
//! println!("{}", result.stdout);
//! ```

use anyhow::{bail, Context, Result};
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

use crate::error::PackError;

/// Directories searched for helper tools: the executable's own directory,
/// then `$PATH`.
pub fn tool_search_path() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(dir);
    }
    if let Some(path) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path));
    }
    dirs
}

/// Resolve `cmd` against `dirs`, first match wins.
pub fn find_tool_in(cmd: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    // join_paths rejects entries containing the separator
    let usable = dirs
        .iter()
        .filter(|dir| !dir.as_os_str().to_string_lossy().contains(':'));
    let paths = std::env::join_paths(usable).ok()?;
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    which::which_in(cmd, Some(paths), cwd).ok()
}

/// Resolve `cmd` against [`tool_search_path`].
pub fn find_tool(cmd: &str) -> Option<PathBuf> {
    find_tool_in(cmd, &tool_search_path())
}

/// Check if a command exists next to the executable or on `$PATH`.
pub fn exists(cmd: &str) -> bool {
    find_tool(cmd).is_some()
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout followed by stderr, the way a terminal would have shown them.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Builder for an external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    error_msg: Option<String>,
    allow_fail: bool,
    timeout: Option<Duration>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Message used as context when the command exits non-zero.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result even if the command exits non-zero.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Kill the child and fail if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Shell-like rendering of the command line, for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run to completion, capturing stdout and stderr.
    pub fn run(self) -> Result<CommandResult> {
        let program = find_tool(&self.program).unwrap_or_else(|| PathBuf::from(&self.program));
        let mut child = Command::new(&program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;

        // Drain both pipes on their own threads so a chatty child cannot
        // block on a full pipe while we wait on it.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let status = match self.timeout {
            Some(limit) => match child
                .wait_timeout(limit)
                .with_context(|| format!("waiting for {}", self.program))?
            {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PackError::Timeout {
                        tool: self.program.clone(),
                        secs: limit.as_secs(),
                    }
                    .into());
                }
            },
            None => child
                .wait()
                .with_context(|| format!("waiting for {}", self.program))?,
        };

        let result = CommandResult {
            status,
            stdout: join_reader(stdout_reader),
            stderr: join_reader(stderr_reader),
        };

        if !result.success() && !self.allow_fail {
            let msg = self
                .error_msg
                .unwrap_or_else(|| format!("{} failed", self.program));
            bail!("{} ({})\n{}", msg, result.status, result.combined().trim());
        }

        Ok(result)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
