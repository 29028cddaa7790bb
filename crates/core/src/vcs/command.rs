//! Subprocess runner shared by the CLI-backed adapters (hg, svn, bzr).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::VcsError;

/// A single invocation of an external VCS tool.
#[derive(Debug, Clone)]
pub struct VcsCommand {
    program: String,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl VcsCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn display(&self) -> String {
        let args: Vec<_> = self.args.iter().map(|a| a.to_string_lossy()).collect();
        format!("{} {}", self.program, args.join(" "))
    }

    /// Run to completion and return stdout.
    ///
    /// A missing binary maps to [`VcsError::BinaryNotFound`], a non-zero exit
    /// to [`VcsError::CommandFailed`] and expiry of the timeout to
    /// [`VcsError::Timeout`] (the child is killed).
    pub async fn output(self) -> Result<String, VcsError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        debug!(cmd = %self.display(), "running vcs command");
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VcsError::BinaryNotFound(self.program.clone())
                } else {
                    VcsError::Io(e)
                }
            })?,
            Err(_) => {
                warn!(cmd = %self.display(), secs = self.timeout.as_secs(), "vcs command timed out");
                return Err(VcsError::Timeout {
                    tool: self.program.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            debug!(exit_code, %stderr, "vcs command failed");
            return Err(VcsError::CommandFailed {
                tool: self.program,
                exit_code,
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
