//! Named operations - fixed, role-scoped step pipelines

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::StepKind;

pub const ROLE_WEB: &str = "web";
pub const ROLE_STAGING: &str = "staging";
pub const ROLE_DATABASE: &str = "database";

/// Operations the orchestrator knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deploy,
    Stage,
    InitializeServer,
    InitializeStagingServer,
    SetupDb,
    SyncConfig,
    UpgradeDeps,
    DistributeCredentials,
    Restart,
    SetupWeb,
    CreateDbUser,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::Deploy,
        Operation::Stage,
        Operation::InitializeServer,
        Operation::InitializeStagingServer,
        Operation::SetupDb,
        Operation::SyncConfig,
        Operation::UpgradeDeps,
        Operation::DistributeCredentials,
        Operation::Restart,
        Operation::SetupWeb,
        Operation::CreateDbUser,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Stage => "stage",
            Self::InitializeServer => "initialize_server",
            Self::InitializeStagingServer => "initialize_staging_server",
            Self::SetupDb => "setup_db",
            Self::SyncConfig => "sync_config",
            Self::UpgradeDeps => "upgrade_deps",
            Self::DistributeCredentials => "distribute_credentials",
            Self::Restart => "restart",
            Self::SetupWeb => "setup_web",
            Self::CreateDbUser => "create_db_user",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Deploy => "Deploy the deploy branch to the web servers and restart them",
            Self::Stage => "Deploy a branch (default master) to the staging server",
            Self::InitializeServer => "Bring a fresh web server up to a deployable state",
            Self::InitializeStagingServer => "Bring a fresh staging server up on master",
            Self::SetupDb => "Load the database schema without touching existing data",
            Self::SyncConfig => "Reset the config working copy to its branch",
            Self::UpgradeDeps => "Upgrade packages to the manifest's pinned versions",
            Self::DistributeCredentials => "Upload the environment's credential bundle",
            Self::Restart => "Restart the managed service",
            Self::SetupWeb => "Upgrade packages and restart a web node",
            Self::CreateDbUser => "Create the application's database role",
        }
    }

    /// Roles this operation may target; the first is the default
    pub fn roles(&self) -> &'static [&'static str] {
        match self {
            Self::Deploy | Self::InitializeServer | Self::SetupWeb => &[ROLE_WEB],
            Self::Stage | Self::InitializeStagingServer => &[ROLE_STAGING],
            Self::SetupDb => &[ROLE_DATABASE, ROLE_WEB],
            Self::SyncConfig | Self::DistributeCredentials | Self::Restart => {
                &[ROLE_WEB, ROLE_STAGING]
            }
            Self::UpgradeDeps => &[ROLE_WEB, ROLE_STAGING, ROLE_DATABASE],
            Self::CreateDbUser => &[ROLE_DATABASE],
        }
    }

    pub fn default_role(&self) -> &'static str {
        self.roles()[0]
    }

    /// Ordered steps run on every targeted host
    pub fn steps(&self) -> &'static [StepKind] {
        use StepKind::*;
        match self {
            Self::Deploy | Self::Stage => &[ConfigSync, DependencyUpgrade, ServiceRestart],
            Self::InitializeServer | Self::InitializeStagingServer => &[
                RuntimeSetup,
                ConfigSync,
                DependencyUpgrade,
                CredentialDistribute,
                SchemaLoad,
            ],
            Self::SetupDb => &[SchemaLoad],
            Self::SyncConfig => &[ConfigSync],
            Self::UpgradeDeps => &[DependencyUpgrade],
            Self::DistributeCredentials => &[CredentialDistribute],
            Self::Restart => &[ServiceRestart],
            Self::SetupWeb => &[DependencyUpgrade, ServiceRestart],
            Self::CreateDbUser => &[DbUserCreate],
        }
    }

    /// Branch the operation always uses, if it does not take one
    pub fn fixed_branch(&self) -> Option<&'static str> {
        match self {
            Self::Deploy => Some("deploy"),
            Self::InitializeStagingServer => Some("master"),
            _ => None,
        }
    }

    /// Branch used when the caller does not name one
    pub fn default_branch(&self, role: &str) -> &'static str {
        match self.fixed_branch() {
            Some(branch) => branch,
            None if role == ROLE_STAGING => "master",
            None => "deploy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
