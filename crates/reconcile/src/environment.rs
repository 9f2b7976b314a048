//! Environment resolution - branch name → deployment target
//!
//! The set of environments is closed. Mapping a branch is a total function
//! over that set; anything else is [`Error::UnsupportedBranch`], because a
//! credential mix-up between production and staging is a security failure.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::types::RemotePath;

/// Known deployment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    Production,
    Staging,
}

impl EnvironmentKind {
    pub const ALL: [EnvironmentKind; 2] = [EnvironmentKind::Production, EnvironmentKind::Staging];

    /// Resolve a branch name
    pub fn from_branch(branch: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.branch() == branch)
            .ok_or_else(|| Error::UnsupportedBranch {
                branch: branch.to_string(),
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
        }
    }

    /// Source branch the config working copy tracks
    pub fn branch(&self) -> &'static str {
        match self {
            Self::Production => "deploy",
            Self::Staging => "master",
        }
    }

    /// Folder under `config/` holding this environment's credential bundle
    pub fn credential_folder(&self) -> &'static str {
        match self {
            Self::Production => "wmflabs",
            Self::Staging => "wmflabs-staging",
        }
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The single environment an operation runs against
///
/// Resolved once when an operation is planned and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    kind: EnvironmentKind,
    config_root: RemotePath,
}

impl Environment {
    pub fn new(kind: EnvironmentKind, config_root: RemotePath) -> Self {
        Self { kind, config_root }
    }

    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn branch(&self) -> &'static str {
        self.kind.branch()
    }

    pub fn credential_folder(&self) -> &'static str {
        self.kind.credential_folder()
    }

    pub fn config_root(&self) -> &RemotePath {
        &self.config_root
    }

    /// Remote-tracking ref the working copy is reset to
    pub fn remote_ref(&self) -> String {
        format!("origin/{}", self.branch())
    }
}

/// Maps branch names to environments for one config root
#[derive(Debug, Clone)]
pub struct EnvironmentResolver {
    config_root: RemotePath,
}

impl EnvironmentResolver {
    pub fn new(config_root: RemotePath) -> Self {
        Self { config_root }
    }

    /// Pure lookup; never contacts a host
    pub fn resolve(&self, branch: &str) -> Result<Environment> {
        let kind = EnvironmentKind::from_branch(branch)?;
        Ok(Environment::new(kind, self.config_root.clone()))
    }
}
