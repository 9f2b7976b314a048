//! Credential distribution
//!
//! The bundle for an environment is every `*.yaml` file directly under
//! `<source root>/config/<credential folder>/` on the operator's machine.
//! Each file is uploaded with elevated rights into the host's config
//! directory and immediately handed to the service identity, one file at a
//! time. Re-running overwrites, so a partial run is repaired by running again.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::context::HostSession;
use crate::environment::EnvironmentKind;
use crate::error::{Error, Result};
use crate::layout::RemoteLayout;
use crate::transport::RemoteCommand;
use crate::types::StepKind;

const STEP: StepKind = StepKind::CredentialDistribute;

/// Local directory holding `config/<folder>/*.yaml` bundles
#[derive(Debug, Clone)]
pub struct CredentialSource {
    root: PathBuf,
}

impl CredentialSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder(&self, kind: EnvironmentKind) -> PathBuf {
        self.root.join("config").join(kind.credential_folder())
    }

    /// Enumerate the bundle for an environment, sorted by file name
    pub fn bundle(&self, kind: EnvironmentKind) -> Result<CredentialBundle> {
        let folder = self.folder(kind);

        if !folder.is_dir() {
            return Err(Error::Credentials {
                path: folder,
                message: "directory not found".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&folder)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry = entry.map_err(|e| Error::Credentials {
                path: folder.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "yaml") {
                files.push(path.to_path_buf());
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(Error::Credentials {
                path: folder,
                message: "no *.yaml files".to_string(),
            });
        }

        Ok(CredentialBundle { kind, files })
    }
}

/// Secret files for one environment
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub kind: EnvironmentKind,
    pub files: Vec<PathBuf>,
}

impl CredentialBundle {
    pub fn file_names(&self) -> Vec<String> {
        self.files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect()
    }
}

pub struct CredentialDistributor<'a> {
    layout: &'a RemoteLayout,
    source: &'a CredentialSource,
}

impl<'a> CredentialDistributor<'a> {
    pub fn new(layout: &'a RemoteLayout, source: &'a CredentialSource) -> Self {
        Self { layout, source }
    }

    /// Upload the session environment's bundle; returns the number of files
    pub fn distribute(&self, session: &HostSession<'_>) -> Result<usize> {
        let bundle = self.source.bundle(session.environment.kind())?;
        let host = session.host.as_str();
        let owner = self.layout.identity.owner_spec();
        let config_dir = self.layout.config_dir();

        for file in &bundle.files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| Error::Credentials {
                    path: file.clone(),
                    message: "not a file".to_string(),
                })?;
            let remote = config_dir.join(&name);

            session.upload(STEP, file, &remote, true)?;

            let chown = RemoteCommand::new(["chown", owner.as_str(), remote.as_str()]).as_root();
            session.run(STEP, &chown).map_err(|e| {
                e.inconsistent(host, STEP, format!("{remote} uploaded but not owned by {owner}"))
            })?;
        }

        log::info!(
            "[{}] distributed {} {} credential file(s)",
            host,
            bundle.files.len(),
            bundle.kind
        );
        Ok(bundle.files.len())
    }
}
