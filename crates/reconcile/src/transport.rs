//! Transport contract and remote command construction
//!
//! The engine never talks to a host directly. It builds a [`RemoteCommand`]
//! (argv, privilege, environment) and hands it to a [`Transport`]. Commands
//! never depend on a remote working directory: every path is absolute.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::types::{CommandOutput, Host, RemotePath};

/// The least-privileged identity the managed service runs as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceIdentity {
    pub user: String,
    pub group: String,
}

impl ServiceIdentity {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }

    /// `user:group` as accepted by chown
    pub fn owner_spec(&self) -> String {
        format!("{}:{}", self.user, self.group)
    }
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self::new("www-data", "www-data")
    }
}

/// Who a remote command runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privilege {
    /// The connecting (operator) account, no sudo
    Operator,
    /// root via sudo; only for ownership changes and service control
    Root,
    /// A specific identity via `sudo -u -g`
    As(ServiceIdentity),
}

/// A command to execute on a remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub argv: Vec<String>,
    pub privilege: Privilege,
    pub env: Vec<(String, String)>,
}

impl RemoteCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            privilege: Privilege::Operator,
            env: Vec::new(),
        }
    }

    pub fn as_root(mut self) -> Self {
        self.privilege = Privilege::Root;
        self
    }

    pub fn as_identity(mut self, identity: &ServiceIdentity) -> Self {
        self.privilege = Privilege::As(identity.clone());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    /// The argv with the sudo and env prefix applied
    pub fn wrapped_argv(&self) -> Vec<String> {
        let mut wrapped = Vec::with_capacity(self.argv.len() + 8);

        match &self.privilege {
            Privilege::Operator => {}
            Privilege::Root => wrapped.extend(["sudo".to_string(), "-n".to_string()]),
            Privilege::As(identity) => wrapped.extend([
                "sudo".to_string(),
                "-n".to_string(),
                "-u".to_string(),
                identity.user.clone(),
                "-g".to_string(),
                identity.group.clone(),
            ]),
        }

        if !self.env.is_empty() {
            wrapped.push("env".to_string());
            for (key, value) in &self.env {
                wrapped.push(format!("{key}={value}"));
            }
        } else if !wrapped.is_empty() {
            wrapped.push("--".to_string());
        }

        wrapped.extend(self.argv.iter().cloned());
        wrapped
    }

    /// Single shell string suitable for an ssh remote command
    pub fn to_shell(&self) -> String {
        shell_join(&self.wrapped_argv())
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Executes commands and uploads files on named remote hosts
///
/// Retries, if any, belong to implementations of this trait; the
/// orchestrator never retries a failed step.
pub trait Transport: Send + Sync {
    /// Run a command; a non-zero exit is returned as output, not as an error
    fn execute(&self, host: &Host, command: &RemoteCommand) -> Result<CommandOutput>;

    /// Copy a local file to `remote`, with elevated rights when `elevated`
    fn upload(&self, host: &Host, local: &Path, remote: &RemotePath, elevated: bool)
    -> Result<()>;
}

/// Quote one word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Quote and join an argv for a POSIX shell
pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_command_is_unwrapped() {
        let cmd = RemoteCommand::new(["uptime"]);
        assert_eq!(cmd.wrapped_argv(), vec!["uptime"]);
    }

    #[test]
    fn test_service_identity_wraps_with_sudo_and_env() {
        let identity = ServiceIdentity::default();
        let cmd = RemoteCommand::new(["git", "fetch", "origin"])
            .as_identity(&identity)
            .env("HOME", "/srv/wikilabels");

        assert_eq!(
            cmd.to_shell(),
            "sudo -n -u www-data -g www-data env HOME=/srv/wikilabels git fetch origin"
        );
    }

    #[test]
    fn test_root_without_env_ends_options() {
        let cmd = RemoteCommand::new(["uwsgictl", "restart"]).as_root();
        assert_eq!(cmd.wrapped_argv(), vec!["sudo", "-n", "--", "uwsgictl", "restart"]);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("origin/deploy"), "origin/deploy");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
