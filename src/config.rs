//! deckhand.toml - fleet topology and remote layout
//!
//! Every section is optional; omitted values fall back to the built-in
//! wikilabels deployment.

use anyhow::{Context, Result};
use reconcile::{
    CredentialSource, DatabaseSettings, EnvironmentKind, OrchestratorConfig, RemoteLayout,
    RetryConfig, RoleRegistry, ServiceSettings,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckhandConfig {
    /// Role name → ordered host names
    pub roles: BTreeMap<String, Vec<String>>,
    pub layout: RemoteLayout,
    pub service: ServiceConfig,
    pub database: DatabaseSettings,
    pub transport: TransportConfig,
    pub credentials: CredentialsConfig,
}

impl Default for DeckhandConfig {
    fn default() -> Self {
        let role = |host: &str| vec![host.to_string()];
        Self {
            roles: BTreeMap::from([
                ("web".to_string(), role("labels-web.eqiad.wmflabs")),
                ("staging".to_string(), role("labels-staging.eqiad.wmflabs")),
                ("database".to_string(), role("labels-database.eqiad.wmflabs")),
            ]),
            layout: RemoteLayout::default(),
            service: ServiceConfig::default(),
            database: DatabaseSettings::default(),
            transport: TransportConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Restart command, run as root
    pub restart: Vec<String>,
    pub health: HealthConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            restart: ServiceSettings::default().restart,
            health: HealthConfig::default(),
        }
    }
}

/// Post-restart health check; disabled unless a URL is set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// URL for production hosts; `{host}` is replaced by the host name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<String>,
    /// URL for staging hosts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging: Option<String>,
    pub attempts: u32,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            production: None,
            staging: None,
            attempts: 5,
            interval_secs: 2,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ssh: String,
    pub scp: String,
    /// Login user; `None` defers to the operator's ssh config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Extra `-o` options passed to ssh and scp
    pub options: Vec<String>,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// Attempts for connection failures (ssh exit 255)
    pub attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            scp: "scp".to_string(),
            user: None,
            options: Vec::new(),
            connect_timeout_secs: 10,
            command_timeout_secs: 1800,
            attempts: 3,
        }
    }
}

impl TransportConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.attempts,
            ..RetryConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Local directory holding `config/<folder>/*.yaml`
    pub root: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
        }
    }
}

impl DeckhandConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Problems that would make an operation misbehave; empty when valid
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.roles.is_empty() {
            problems.push("no roles defined".to_string());
        }
        for (role, hosts) in &self.roles {
            if hosts.is_empty() {
                problems.push(format!("role '{role}' has no hosts"));
            }
            if hosts.iter().any(|h| h.trim().is_empty()) {
                problems.push(format!("role '{role}' contains an empty host name"));
            }
        }

        for (name, path) in [
            ("layout.config_root", &self.layout.config_root),
            ("layout.venv", &self.layout.venv),
            ("layout.home", &self.layout.home),
        ] {
            if !path.is_absolute() {
                problems.push(format!("{name} must be an absolute path, got '{path}'"));
            }
        }
        if self.layout.requirements.starts_with('/') {
            problems.push("layout.requirements must be relative to config_root".to_string());
        }
        if self.layout.identity.user.is_empty() || self.layout.identity.group.is_empty() {
            problems.push("layout.identity needs both user and group".to_string());
        }

        if self.service.restart.is_empty() {
            problems.push("service.restart is empty".to_string());
        }
        if self.service.health.attempts == 0 {
            problems.push("service.health.attempts must be at least 1".to_string());
        }

        if self.transport.attempts == 0 {
            problems.push("transport.attempts must be at least 1".to_string());
        }
        if self.transport.command_timeout_secs == 0 {
            problems.push("transport.command_timeout_secs must be positive".to_string());
        }

        problems
    }

    /// Refuse to act on a config that `validate` finds problems in
    pub fn ensure_valid(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        anyhow::bail!(
            "Invalid configuration ({} problem(s)): {}",
            problems.len(),
            problems.join("; ")
        )
    }

    pub fn credentials_root(&self) -> PathBuf {
        paths::expand(&self.credentials.root)
    }

    pub fn registry(&self) -> RoleRegistry {
        let mut registry = RoleRegistry::new();
        for (role, hosts) in &self.roles {
            registry.insert(role, hosts.iter().map(String::as_str));
        }
        registry
    }

    fn service_settings(&self) -> ServiceSettings {
        let health = &self.service.health;
        let mut health_urls = HashMap::new();
        if let Some(url) = &health.production {
            health_urls.insert(EnvironmentKind::Production, url.clone());
        }
        if let Some(url) = &health.staging {
            health_urls.insert(EnvironmentKind::Staging, url.clone());
        }

        ServiceSettings {
            restart: self.service.restart.clone(),
            health_urls,
            health_retry: RetryConfig {
                max_attempts: health.attempts,
                base_delay: Duration::from_secs(health.interval_secs),
                ..ServiceSettings::default().health_retry
            },
        }
    }

    pub fn orchestrator_config(&self, jobs: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            registry: self.registry(),
            layout: self.layout.clone(),
            service: self.service_settings(),
            database: self.database.clone(),
            credentials: CredentialSource::new(self.credentials_root()),
            jobs,
        }
    }
}
