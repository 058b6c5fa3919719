//! Container engine access through its command-line client

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::{Context, Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs `<binary> <args...>` and waits for it within the [`Context`] deadline.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run a command and capture its output, whatever its exit status.
    ///
    /// The child is killed if the deadline passes first.
    pub fn run(&self, ctx: &Context, args: &[&str]) -> Result<CommandOutput> {
        // Arguments may carry passwords; only the subcommand is ever reported.
        let command = self.describe(args);
        ctx.check(&command)?;

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn {
                command: command.clone(),
                source: e,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if ctx.is_expired() => {
                    kill(&mut child, &command);
                    return Err(Error::DeadlineExceeded { operation: command });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill(&mut child, &command);
                    return Err(Error::Spawn { command, source: e });
                }
            }
        };

        let output = CommandOutput {
            // Killed by a signal: no code.
            code: status.code().unwrap_or(-1),
            stdout: join(stdout),
            stderr: join(stderr),
        };
        debug!(%command, code = output.code, "Command finished");
        Ok(output)
    }

    /// Like [`DockerCli::run`] but a non-zero exit status is an error.
    pub fn run_checked(&self, ctx: &Context, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(ctx, args)?;
        if !output.success() {
            return Err(Error::CommandFailed {
                command: self.describe(args),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn describe(&self, args: &[&str]) -> String {
        match args.first() {
            Some(subcommand) => format!("{} {subcommand}", self.binary),
            None => self.binary.clone(),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child, command: &str) {
    if let Err(e) = child.kill() {
        warn!(%command, error = %e, "Failed to kill command");
    }
    let _ = child.wait();
}
