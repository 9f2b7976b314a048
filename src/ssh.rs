//! SSH transport - runs remote commands through the local `ssh` and `scp`
//!
//! The operator's ssh config (aliases, jump hosts, keys) applies unchanged.
//! Connection failures (ssh exit 255) are retried with backoff; a command
//! that ran and failed never is.

use reconcile::{
    CancelToken, CommandOutput, Error, Host, LogCallback, RemoteCommand, RemotePath, Result,
    RetryConfig, Transport, with_retry_cancellable,
};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::runner::{self, Finished};

/// Exit status ssh reserves for its own errors
const SSH_CONNECTION_FAILURE: i32 = 255;

pub struct SshTransport {
    settings: TransportConfig,
    retry: RetryConfig,
    cancel: CancelToken,
}

impl SshTransport {
    pub fn new(settings: TransportConfig, cancel: CancelToken) -> Self {
        let retry = settings.retry();
        Self {
            settings,
            retry,
            cancel,
        }
    }

    #[cfg(test)]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn destination(&self, host: &Host) -> String {
        match &self.settings.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }

    fn options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.settings.connect_timeout_secs),
        ];
        for option in &self.settings.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }

    /// Arguments for `ssh` running `command` on `host`
    pub fn ssh_args(&self, host: &Host, command: &RemoteCommand) -> Vec<String> {
        let mut args = self.options();
        args.push(self.destination(host));
        args.push("--".to_string());
        args.push(command.to_shell());
        args
    }

    /// Arguments for `scp` copying `local` to `host:remote`
    pub fn scp_args(&self, host: &Host, local: &Path, remote: &str) -> Vec<String> {
        let mut args = self.options();
        args.push("-q".to_string());
        args.push("--".to_string());
        args.push(local.display().to_string());
        args.push(format!("{}:{}", self.destination(host), remote));
        args
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.command_timeout_secs)
    }

    /// Run one local client process; `shown` is what errors report as the command
    fn spawn(
        &self,
        host: &Host,
        program: &str,
        args: &[String],
        shown: &str,
    ) -> Result<CommandOutput> {
        log::trace!("{} {}", program, args.join(" "));

        let finished = runner::run_supervised(
            Command::new(program).args(args),
            self.timeout(),
            &self.cancel,
        )
        .map_err(|e| Error::Other(format!("Failed to execute {program}: {e}")))?;

        match finished {
            Finished::Exited {
                code: Some(SSH_CONNECTION_FAILURE),
                stderr,
                ..
            } => Err(Error::Connection {
                host: host.to_string(),
                message: stderr.trim().to_string(),
            }),
            Finished::Exited {
                code,
                stdout,
                stderr,
            } => Ok(CommandOutput {
                exit_code: code.unwrap_or(-1),
                stdout,
                stderr,
            }),
            Finished::TimedOut => Err(Error::TimedOut {
                host: host.to_string(),
                command: shown.to_string(),
                after: self.timeout(),
            }),
            Finished::Cancelled => Err(Error::Other(format!("{shown}: cancelled"))),
        }
    }

    fn scp(&self, host: &Host, local: &Path, remote: &str) -> Result<()> {
        let args = self.scp_args(host, local, remote);
        let shown = format!("scp {} {}", local.display(), remote);

        let output = with_retry_cancellable(
            &self.retry,
            Some(&LogCallback),
            &self.cancel,
            || self.spawn(host, &self.settings.scp, &args, &shown),
        )?;

        if output.success() {
            return Ok(());
        }
        Err(Error::Upload {
            host: host.to_string(),
            local: local.to_path_buf(),
            remote: remote.to_string(),
            message: output.stderr.trim().to_string(),
        })
    }
}

/// Staging name for an elevated upload, named by content digest
///
/// Relative, so scp and the later `mv` both resolve it in the login
/// user's home rather than a world-shared directory.
pub fn staging_path(content: &[u8]) -> String {
    let digest = blake3::hash(content).to_hex();
    format!(".deckhand-{}", &digest[..16])
}

impl Transport for SshTransport {
    fn execute(&self, host: &Host, command: &RemoteCommand) -> Result<CommandOutput> {
        let args = self.ssh_args(host, command);
        let shown = command.to_string();

        with_retry_cancellable(&self.retry, Some(&LogCallback), &self.cancel, || {
            self.spawn(host, &self.settings.ssh, &args, &shown)
        })
    }

    fn upload(&self, host: &Host, local: &Path, remote: &RemotePath, elevated: bool) -> Result<()> {
        if !elevated {
            return self.scp(host, local, remote.as_str());
        }

        let content = fs::read(local).map_err(|e| Error::Credentials {
            path: local.to_path_buf(),
            message: e.to_string(),
        })?;
        let staged = staging_path(&content);
        self.scp(host, local, &staged)?;

        let upload_error = |what: &str, output: &CommandOutput| Error::Upload {
            host: host.to_string(),
            local: local.to_path_buf(),
            remote: remote.to_string(),
            message: format!("staged at ~/{staged} but {what}: {}", output.stderr.trim()),
        };

        let chmod = RemoteCommand::new(["chmod", "600", staged.as_str()]);
        let output = self.execute(host, &chmod)?;
        if !output.success() {
            return Err(upload_error("not made private", &output));
        }

        let mv = RemoteCommand::new(["mv", "-f", staged.as_str(), remote.as_str()]).as_root();
        let output = self.execute(host, &mv)?;
        if !output.success() {
            return Err(upload_error("not moved", &output));
        }
        Ok(())
    }
}
