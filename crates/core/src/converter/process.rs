//! External engine invocation.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::error::ConvertError;

/// Captured output of a successful engine run.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl EngineOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// A single invocation of an external engine binary.
///
/// The child is killed when the wall-clock limit expires. A non-zero exit
/// becomes [`ConvertError::Engine`] carrying the engine's stderr verbatim.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    engine: &'static str,
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    timeout: Duration,
    /// Non-zero exit codes that still count as success.
    accepted_codes: Vec<i32>,
}

impl EngineCommand {
    pub fn new(engine: &'static str, program: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            engine,
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            current_dir: None,
            timeout,
            accepted_codes: Vec::new(),
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

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Treats `code` as success, for engines that exit non-zero on warnings.
    pub fn accept_exit_code(mut self, code: i32) -> Self {
        self.accepted_codes.push(code);
        self
    }

    pub fn engine(&self) -> &'static str {
        self.engine
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Runs the engine to completion.
    pub async fn run(self) -> Result<EngineOutput, ConvertError> {
        debug!(
            engine = self.engine,
            program = %self.program.display(),
            args = ?self.args,
            "Invoking engine"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConvertError::engine_missing(self.engine, &self.program)
            } else {
                ConvertError::Io(e)
            }
        })?;

        // Dropping the wait future on expiry drops the child, which kills it.
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConvertError::Timeout {
                    engine: self.engine.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let accepted = output
            .status
            .code()
            .is_some_and(|code| self.accepted_codes.contains(&code));
        if !output.status.success() && !accepted {
            let detail = if stderr.is_empty() {
                format!("{} exited with {}", self.engine, output.status)
            } else {
                stderr
            };
            return Err(ConvertError::engine(self.engine, detail));
        }

        Ok(EngineOutput {
            stdout: output.stdout,
            stderr,
        })
    }
}
