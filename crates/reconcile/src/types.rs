//! Core types for reconciliation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, ErrorCategory};

/// An addressable machine identity (hostname or FQDN)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Host(String);

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Host {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An absolute POSIX path on a remote host
///
/// Kept separate from `PathBuf` so operator-side path rules never leak into
/// remote paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePath(String);

impl RemotePath {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            Self("/".to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Append a relative component
    pub fn join(&self, component: &str) -> Self {
        let component = component.trim_matches('/');
        if self.0 == "/" {
            Self(format!("/{component}"))
        } else {
            Self(format!("{}/{}", self.0, component))
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output from a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The kinds of steps an operation pipeline is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Create the isolated runtime environment
    RuntimeSetup,
    /// Fetch, hard-reset and update submodules of the config working copy
    ConfigSync,
    /// Upgrade packages to the manifest's pins
    DependencyUpgrade,
    /// Upload the environment's credential bundle
    CredentialDistribute,
    /// Restart the managed service
    ServiceRestart,
    /// Load the database schema (never overwrites)
    SchemaLoad,
    /// Create the application's database role
    DbUserCreate,
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RuntimeSetup => "runtime setup",
            Self::ConfigSync => "config sync",
            Self::DependencyUpgrade => "dependency upgrade",
            Self::CredentialDistribute => "credential distribution",
            Self::ServiceRestart => "service restart",
            Self::SchemaLoad => "schema load",
            Self::DbUserCreate => "database user creation",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of running one step on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    /// Step completed
    Completed { detail: Option<String> },
    /// Step failed; later steps were not run
    Failed {
        category: ErrorCategory,
        error: String,
        stdout: String,
        stderr: String,
    },
    /// Step was never reached
    NotRun,
}

impl StepResult {
    pub fn from_error(error: &Error) -> Self {
        let (stdout, stderr) = error.remote_output().unwrap_or_default();
        Self::Failed {
            category: error.category(),
            error: error.to_string(),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// A step and what happened to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: StepKind,
    pub result: StepResult,
    pub duration_ms: u64,
}

/// Final state of a host after an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HostStatus {
    /// Every step completed
    Converged,
    /// A step failed and the rest were skipped
    Failed { step: StepKind },
    /// Cancelled or timed out between remote commands
    Interrupted { step: StepKind },
}

/// Per-host outcome of an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub host: Host,
    pub status: HostStatus,
    /// Commit the config working copy was reset to, when known
    pub revision: Option<String>,
    pub steps: Vec<StepRecord>,
}

impl HostReport {
    pub fn is_success(&self) -> bool {
        self.status == HostStatus::Converged
    }

    /// The failing step record, if any
    pub fn failure(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|r| matches!(r.result, StepResult::Failed { .. }))
    }
}

/// Outcome of one operation over a role-scoped host set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReport {
    pub operation: String,
    pub role: String,
    pub environment: String,
    pub branch: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub hosts: Vec<HostReport>,
}

impl OperationReport {
    /// An operation fails if any targeted host failed
    pub fn is_success(&self) -> bool {
        self.hosts.iter().all(HostReport::is_success)
    }

    pub fn converged(&self) -> usize {
        self.hosts.iter().filter(|h| h.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.hosts.len() - self.converged()
    }

    pub fn host(&self, host: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|h| h.host.as_str() == host)
    }
}
