//! Child-process execution for greenlight.
//!
//! Release targets shell out to publishing tools (`cargo`, `npm`, `twine`,
//! `pod`). This crate runs those commands with both output pipes streamed
//! line-by-line to the caller's logger and returns the raw stdout bytes on
//! success. Failures carry the exit code, the arguments, and a scrubbed
//! rendering of the spawn options in which environment *values* never
//! appear, only the sorted key names.
//!
//! # Example
//!
//! ```no_run
//! use greenlight_log::MemoryLogger;
//! use greenlight_process::{SpawnOptions, spawn};
//!
//! let log = MemoryLogger::default();
//! let stdout = spawn("cargo", &["--version"], &SpawnOptions::default(), &log).expect("run");
//! assert!(!stdout.is_empty());
//! ```

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use greenlight_log::Logger;
use serde::Serialize;
use thiserror::Error;

/// Options for [`spawn`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpawnOptions {
    /// Working directory for the child. Inherited when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child, on top of the inherited
    /// environment.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl SpawnOptions {
    /// Options with a working directory and no extra environment.
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            env: BTreeMap::new(),
        }
    }

    /// Add one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Rendering safe to embed in error messages: the `env` map is replaced
    /// by the sorted list of its key names.
    fn scrubbed(&self) -> String {
        #[derive(Serialize)]
        struct Scrubbed<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            cwd: Option<&'a PathBuf>,
            env: Vec<&'a str>,
        }

        let scrubbed = Scrubbed {
            cwd: self.cwd.as_ref(),
            env: self.env.keys().map(String::as_str).collect(),
        };
        serde_json::to_string(&scrubbed).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Failure of [`spawn`].
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command name was empty.
    #[error("command name must be a non-empty string")]
    InvalidArgument,

    /// The child ran and exited with a non-zero status.
    #[error("`{command}` exited with code {code} (args: {args:?}, options: {options})")]
    Failed {
        command: String,
        code: i32,
        args: Vec<String>,
        /// Scrubbed options; environment values never appear here.
        options: String,
    },

    /// The child could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run `command` with `args`, streaming both pipes to `logger.debug` with a
/// `"{command}: {line}"` prefix, and return the accumulated stdout bytes.
///
/// Both reader threads are joined before the exit status is inspected, so
/// every buffered line has been delivered by the time this returns.
pub fn spawn(
    command: &str,
    args: &[&str],
    options: &SpawnOptions,
    logger: &dyn Logger,
) -> Result<Vec<u8>, ProcessError> {
    if command.is_empty() {
        return Err(ProcessError::InvalidArgument);
    }

    let mut cmd = Command::new(command);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: command.to_string(),
        source,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let mut stdout_buf = Vec::new();
    thread::scope(|scope| {
        let out = scope.spawn(|| pump(command, stdout, logger, Some(&mut stdout_buf)));
        let err = scope.spawn(|| pump(command, stderr, logger, None));
        let _ = out.join();
        let _ = err.join();
    });

    let status = child.wait().map_err(|source| ProcessError::Spawn {
        command: command.to_string(),
        source,
    })?;

    if status.success() {
        Ok(stdout_buf)
    } else {
        Err(ProcessError::Failed {
            command: command.to_string(),
            code: status.code().unwrap_or(-1),
            args: args.iter().map(|a| a.to_string()).collect(),
            options: options.scrubbed(),
        })
    }
}

/// Forward one pipe to the logger line-wise, optionally keeping the raw
/// bytes. Lines are logged lossily; the byte sink is exact.
fn pump<R: Read>(command: &str, pipe: Option<R>, logger: &dyn Logger, mut sink: Option<&mut Vec<u8>>) {
    let Some(pipe) = pipe else { return };
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if let Some(sink) = sink.as_mut() {
            sink.extend_from_slice(&line);
        }
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim_end_matches(['\n', '\r']);
        if !trimmed.is_empty() {
            logger.debug(&format!("{command}: {trimmed}"));
        }
    }
}

/// Whether `program` resolves on the current `PATH`.
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}
