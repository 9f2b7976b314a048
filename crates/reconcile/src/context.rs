//! Per-host session and cancellation
//!
//! A [`HostSession`] is the only path from a step to the transport. It
//! checks the [`CancelToken`] before each remote command, which makes every
//! command boundary a cancellation point, and turns non-zero exits into
//! [`Error::CommandFailed`].

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::transport::{RemoteCommand, Transport};
use crate::types::{CommandOutput, Host, RemotePath, StepKind};

/// Shared cancellation flag (set from a signal handler or a deadline)
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a step needs to act on one host
pub struct HostSession<'a> {
    pub host: &'a Host,
    pub environment: &'a Environment,
    transport: &'a dyn Transport,
    cancel: &'a CancelToken,
}

impl<'a> HostSession<'a> {
    pub fn new(
        host: &'a Host,
        environment: &'a Environment,
        transport: &'a dyn Transport,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            host,
            environment,
            transport,
            cancel,
        }
    }

    fn interrupted(&self, step: StepKind) -> Error {
        Error::Interrupted {
            host: self.host.to_string(),
            step,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.cancel
    }

    /// Fail with `Interrupted` once the operator has cancelled
    pub fn checkpoint(&self, step: StepKind) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.interrupted(step));
        }
        Ok(())
    }

    /// Run a command and return its output whatever the exit code
    pub fn run_unchecked(&self, step: StepKind, command: &RemoteCommand) -> Result<CommandOutput> {
        self.checkpoint(step)?;
        log::debug!("[{}] {:?}: {}", self.host, command.privilege, command);

        match self.transport.execute(self.host, command) {
            Ok(output) => Ok(output),
            // a transport error after cancellation is the kill, not a real failure
            Err(_) if self.cancel.is_cancelled() => Err(self.interrupted(step)),
            Err(e) => Err(e),
        }
    }

    /// Run a command, failing on non-zero exit
    pub fn run(&self, step: StepKind, command: &RemoteCommand) -> Result<CommandOutput> {
        let output = self.run_unchecked(step, command)?;

        if !output.success() {
            return Err(Error::CommandFailed {
                host: self.host.to_string(),
                command: command.to_string(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }

    /// Upload a file, checking for cancellation first
    pub fn upload(
        &self,
        step: StepKind,
        local: &Path,
        remote: &RemotePath,
        elevated: bool,
    ) -> Result<()> {
        self.checkpoint(step)?;
        log::debug!(
            "[{}] upload {} -> {} (elevated: {})",
            self.host,
            local.display(),
            remote,
            elevated
        );

        match self.transport.upload(self.host, local, remote, elevated) {
            Err(_) if self.cancel.is_cancelled() => Err(self.interrupted(step)),
            other => other,
        }
    }
}
