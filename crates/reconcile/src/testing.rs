//! In-memory transport for tests
//!
//! Records every call, simulates a git working copy per host closely enough
//! to check convergence, tracks uploaded file ownership and lets tests script
//! failures by (host, command fragment).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::context::CancelToken;
use crate::error::{Error, Result};
use crate::transport::{Privilege, RemoteCommand, Transport};
use crate::types::{CommandOutput, Host, RemotePath};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exec {
        host: String,
        command: String,
        privilege: Privilege,
    },
    Upload {
        host: String,
        local: PathBuf,
        remote: String,
        elevated: bool,
    },
}

/// Simulated config working copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeCheckout {
    pub fetched: HashMap<String, String>,
    pub head: Option<String>,
    pub dirty: bool,
    pub submodules: Option<String>,
}

enum Action {
    Exit(i32, String),
    Disconnect,
    TimeOut,
    Cancel(CancelToken),
}

struct Rule {
    host: String,
    fragment: String,
    action: Action,
}

pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    rules: Mutex<Vec<Rule>>,
    remote_heads: Mutex<HashMap<String, String>>,
    checkouts: Mutex<HashMap<String, FakeCheckout>>,
    owners: Mutex<HashMap<(String, String), String>>,
    existing: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let heads = HashMap::from([
            ("deploy".to_string(), "d3p10y".to_string()),
            ("master".to_string(), "ma5732".to_string()),
        ]);
        Self {
            calls: Mutex::new(Vec::new()),
            rules: Mutex::new(Vec::new()),
            remote_heads: Mutex::new(heads),
            checkouts: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
            existing: Mutex::new(Vec::new()),
        }
    }

    fn rule(&self, host: &str, fragment: &str, action: Action) {
        self.rules.lock().unwrap().push(Rule {
            host: host.to_string(),
            fragment: fragment.to_string(),
            action,
        });
    }

    /// Exit with `code` when a command on `host` contains `fragment`
    pub fn fail_on(&self, host: &str, fragment: &str, code: i32, stderr: &str) {
        self.rule(host, fragment, Action::Exit(code, stderr.to_string()));
    }

    pub fn disconnect_on(&self, host: &str, fragment: &str) {
        self.rule(host, fragment, Action::Disconnect);
    }

    pub fn time_out_on(&self, host: &str, fragment: &str) {
        self.rule(host, fragment, Action::TimeOut);
    }

    /// Cancel `token` while the matching command runs (the command succeeds)
    pub fn cancel_on(&self, host: &str, fragment: &str, token: &CancelToken) {
        self.rule(host, fragment, Action::Cancel(token.clone()));
    }

    /// Make `test -x <path>` succeed on `host`
    pub fn mark_existing(&self, host: &str, path: &str) {
        self.existing
            .lock()
            .unwrap()
            .push((host.to_string(), path.to_string()));
    }

    /// Move `branch` on the simulated origin
    pub fn set_remote_head(&self, branch: &str, commit: &str) {
        self.remote_heads
            .lock()
            .unwrap()
            .insert(branch.to_string(), commit.to_string());
    }

    pub fn make_dirty(&self, host: &str) {
        self.checkouts
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .dirty = true;
    }

    pub fn checkout(&self, host: &str) -> FakeCheckout {
        self.checkouts
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    pub fn owner(&self, host: &str, path: &str) -> Option<String> {
        self.owners
            .lock()
            .unwrap()
            .get(&(host.to_string(), path.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Unwrapped command lines executed on `host`, in order
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Exec { host: h, command, .. } if h == host => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Remote destinations uploaded to `host`, in order
    pub fn uploads_for(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload { host: h, remote, .. } if h == host => Some(remote),
                _ => None,
            })
            .collect()
    }

    fn scripted(&self, host: &str, line: &str) -> Option<Result<CommandOutput>> {
        let rules = self.rules.lock().unwrap();
        let rule = rules
            .iter()
            .find(|r| (r.host == host || r.host == "*") && line.contains(&r.fragment))?;

        match &rule.action {
            Action::Exit(code, stderr) => Some(Ok(CommandOutput {
                exit_code: *code,
                stdout: String::new(),
                stderr: stderr.clone(),
            })),
            Action::Disconnect => Some(Err(Error::Connection {
                host: host.to_string(),
                message: "Connection reset by peer".to_string(),
            })),
            Action::TimeOut => Some(Err(Error::TimedOut {
                host: host.to_string(),
                command: line.to_string(),
                after: Duration::from_secs(1800),
            })),
            Action::Cancel(token) => {
                token.cancel();
                None
            }
        }
    }

    fn simulate(&self, host: &str, argv: &[String]) -> CommandOutput {
        let ok = |stdout: &str| CommandOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        };
        let words: Vec<&str> = argv.iter().map(String::as_str).collect();

        match words.as_slice() {
            ["git", "-C", _, "fetch", ..] => {
                let heads = self.remote_heads.lock().unwrap().clone();
                self.checkouts
                    .lock()
                    .unwrap()
                    .entry(host.to_string())
                    .or_default()
                    .fetched = heads;
                ok("")
            }
            ["git", "-C", _, "reset", "--hard", target] => {
                let mut checkouts = self.checkouts.lock().unwrap();
                let checkout = checkouts.entry(host.to_string()).or_default();
                let branch = target.trim_start_matches("origin/");
                match checkout.fetched.get(branch).cloned() {
                    Some(commit) => {
                        if checkout.head.as_ref() != Some(&commit) {
                            checkout.submodules = None;
                        }
                        checkout.head = Some(commit);
                        checkout.dirty = false;
                        ok("")
                    }
                    None => CommandOutput {
                        exit_code: 128,
                        stdout: String::new(),
                        stderr: format!("fatal: ambiguous argument '{target}'"),
                    },
                }
            }
            ["git", "-C", _, "submodule", "update", ..] => {
                let mut checkouts = self.checkouts.lock().unwrap();
                let checkout = checkouts.entry(host.to_string()).or_default();
                checkout.submodules = checkout.head.clone();
                ok("")
            }
            ["git", "-C", _, "rev-parse", "HEAD"] => {
                let head = self.checkout(host).head.unwrap_or_default();
                ok(&format!("{head}\n"))
            }
            ["chown", owner, path] => {
                self.owners
                    .lock()
                    .unwrap()
                    .insert((host.to_string(), path.to_string()), owner.to_string());
                ok("")
            }
            ["test", "-x", path] => {
                let exists = self
                    .existing
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|(h, p)| h == host && p == path);
                CommandOutput {
                    exit_code: if exists { 0 } else { 1 },
                    ..CommandOutput::default()
                }
            }
            _ => ok(""),
        }
    }
}

impl Transport for MockTransport {
    fn execute(&self, host: &Host, command: &RemoteCommand) -> Result<CommandOutput> {
        let line = command.to_string();
        self.calls.lock().unwrap().push(Call::Exec {
            host: host.to_string(),
            command: line.clone(),
            privilege: command.privilege.clone(),
        });

        if let Some(result) = self.scripted(host.as_str(), &line) {
            return result;
        }
        Ok(self.simulate(host.as_str(), &command.argv))
    }

    fn upload(
        &self,
        host: &Host,
        local: &Path,
        remote: &RemotePath,
        elevated: bool,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Upload {
            host: host.to_string(),
            local: local.to_path_buf(),
            remote: remote.to_string(),
            elevated,
        });

        let line = format!("upload {remote}");
        if let Some(result) = self.scripted(host.as_str(), &line) {
            return result.and_then(|output| {
                if output.success() {
                    Ok(())
                } else {
                    Err(Error::Upload {
                        host: host.to_string(),
                        local: local.to_path_buf(),
                        remote: remote.to_string(),
                        message: output.stderr,
                    })
                }
            });
        }

        let owner = if elevated { "root:root" } else { "operator" };
        self.owners
            .lock()
            .unwrap()
            .insert((host.to_string(), remote.to_string()), owner.to_string());
        Ok(())
    }
}
