//! Error types for reconciliation.
//!
//! Errors are categorized so the orchestrator can tell resolution mistakes
//! (caught before any remote action) apart from transport failures and from
//! hosts left in an intermediate state. Every host-bound variant carries the
//! host identity so per-host reports can be rendered without extra context.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::StepKind;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Unknown role, unsupported branch or an out-of-role host filter
    Resolution,
    /// Remote command, connection or upload failure
    Transport,
    /// A step partially applied and left the host indeterminate
    StateInconsistency,
    /// Timeout or operator cancellation between remote commands
    Interrupted,
    /// Local configuration or credential bundle problem
    Configuration,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Resolution => "Invalid target selection",
            Self::Transport => "Remote command failed",
            Self::StateInconsistency => "Host left in an intermediate state",
            Self::Interrupted => "Interrupted",
            Self::Configuration => "Configuration problem",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Resolution => "Check the role, host filter and branch, then run again",
            Self::Transport => "Inspect the remote output below; re-running is safe",
            Self::StateInconsistency => {
                "Inspect the host manually before re-running; nothing was rolled back"
            }
            Self::Interrupted => "The host was left at the interrupted step; re-run to converge",
            Self::Configuration => "Fix the local configuration or credential files",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while resolving or reconciling hosts.
#[derive(Debug, Error)]
pub enum Error {
    /// Role is not registered in the topology
    #[error("unknown role '{role}'")]
    UnknownRole { role: String },

    /// Branch has no environment, credential folder or config mapping
    #[error("unsupported branch '{branch}' (known: deploy, master)")]
    UnsupportedBranch { branch: String },

    /// Host filter names a host outside the targeted role
    #[error("host '{host}' is not a member of role '{role}'")]
    HostNotInRole { host: String, role: String },

    /// Operation was pointed at a role it does not declare
    #[error("operation '{operation}' cannot target role '{role}'")]
    RoleNotAllowed { operation: String, role: String },

    /// Operation pins its branch and a different one was requested
    #[error("operation '{operation}' always uses branch '{required}', got '{branch}'")]
    FixedBranch {
        operation: String,
        branch: String,
        required: String,
    },

    /// Remote command exited non-zero
    #[error("command failed on {host} (exit {exit_code}): {command}")]
    CommandFailed {
        host: String,
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// Could not reach the host at all
    #[error("connection to {host} failed: {message}")]
    Connection { host: String, message: String },

    /// Remote command exceeded the transport deadline
    #[error("command timed out on {host} after {}s: {command}", after.as_secs())]
    TimedOut {
        host: String,
        command: String,
        after: Duration,
    },

    /// File upload failed
    #[error("upload of {} to {host}:{remote} failed: {message}", local.display())]
    Upload {
        host: String,
        local: PathBuf,
        remote: String,
        message: String,
    },

    /// Service did not answer its health endpoint after a restart
    #[error("{host} is not healthy at {url}: {message}")]
    Unhealthy {
        host: String,
        url: String,
        message: String,
    },

    /// A step got partway and stopped
    #[error("{host} left in an intermediate state during {step}: {detail}")]
    Inconsistent {
        host: String,
        step: StepKind,
        detail: String,
        #[source]
        source: Box<Error>,
    },

    /// Cancellation observed at a remote-command boundary
    #[error("interrupted on {host} during {step}")]
    Interrupted { host: String, step: StepKind },

    /// Local credential bundle is missing or unreadable
    #[error("credential bundle at {}: {message}", path.display())]
    Credentials { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnknownRole { .. }
            | Error::UnsupportedBranch { .. }
            | Error::HostNotInRole { .. }
            | Error::RoleNotAllowed { .. }
            | Error::FixedBranch { .. } => ErrorCategory::Resolution,
            Error::CommandFailed { .. }
            | Error::Connection { .. }
            | Error::Upload { .. }
            | Error::Unhealthy { .. } => ErrorCategory::Transport,
            Error::Inconsistent { .. } => ErrorCategory::StateInconsistency,
            Error::Interrupted { .. } | Error::TimedOut { .. } => ErrorCategory::Interrupted,
            Error::Credentials { .. } | Error::Io(_) => ErrorCategory::Configuration,
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether the failure is transient and worth retrying at the transport layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Unhealthy { .. })
    }

    /// Whether the failure means the desired state already holds.
    ///
    /// Only creation commands that report an existing object qualify.
    pub fn is_ignorable(&self) -> bool {
        match self {
            Error::CommandFailed { stderr, .. } => stderr.contains("already exists"),
            _ => false,
        }
    }

    /// Raw remote output (stdout, stderr) if the error carries any.
    pub fn remote_output(&self) -> Option<(&str, &str)> {
        match self {
            Error::CommandFailed { stdout, stderr, .. } => Some((stdout, stderr)),
            Error::Inconsistent { source, .. } => source.remote_output(),
            _ => None,
        }
    }

    /// Wrap a step failure as a state inconsistency, unless it was an interruption.
    pub fn inconsistent(self, host: &str, step: StepKind, detail: impl Into<String>) -> Self {
        match self {
            Error::Interrupted { .. } | Error::TimedOut { .. } | Error::Inconsistent { .. } => self,
            other => Error::Inconsistent {
                host: host.to_string(),
                step,
                detail: detail.into(),
                source: Box::new(other),
            },
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
