//! Remote filesystem layout of a managed host

use serde::{Deserialize, Serialize};

use crate::transport::{RemoteCommand, ServiceIdentity};
use crate::types::RemotePath;

/// Where things live on every host, and who owns them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLayout {
    /// Config working copy (git checkout with submodules)
    pub config_root: RemotePath,
    /// Isolated runtime environment (virtualenv)
    pub venv: RemotePath,
    /// HOME for commands run as the service identity
    pub home: RemotePath,
    /// Dependency manifest, relative to `config_root`
    pub requirements: String,
    pub identity: ServiceIdentity,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            config_root: RemotePath::new("/srv/wikilabels/src"),
            venv: RemotePath::new("/srv/wikilabels/venv"),
            home: RemotePath::new("/srv/wikilabels"),
            requirements: "requirements.txt".to_string(),
            identity: ServiceIdentity::default(),
        }
    }
}

impl RemoteLayout {
    pub fn requirements_path(&self) -> RemotePath {
        self.config_root.join(&self.requirements)
    }

    /// Executable inside the runtime environment
    pub fn venv_bin(&self, name: &str) -> RemotePath {
        self.venv.join("bin").join(name)
    }

    /// Directory the service loads `*.yaml` configuration from
    pub fn config_dir(&self) -> RemotePath {
        self.config_root.join("config")
    }

    /// Build a command that runs as the service identity with its HOME
    pub fn service_command<I, S>(&self, argv: I) -> RemoteCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RemoteCommand::new(argv)
            .as_identity(&self.identity)
            .env("HOME", self.home.as_str())
    }
}
