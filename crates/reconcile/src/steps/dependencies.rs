//! Dependency installer - the host's virtualenv and its pinned packages

use crate::context::HostSession;
use crate::error::Result;
use crate::layout::RemoteLayout;
use crate::transport::RemoteCommand;
use crate::types::StepKind;

pub struct DependencyInstaller<'a> {
    layout: &'a RemoteLayout,
}

impl<'a> DependencyInstaller<'a> {
    pub fn new(layout: &'a RemoteLayout) -> Self {
        Self { layout }
    }

    /// Create the isolated environment if it does not exist yet
    ///
    /// Returns `false` when an existing environment was left alone.
    pub fn setup(&self, session: &HostSession<'_>) -> Result<bool> {
        let step = StepKind::RuntimeSetup;
        let pip = self.layout.venv_bin("pip");

        let probe = RemoteCommand::new(["test", "-x", pip.as_str()]);
        if session.run_unchecked(step, &probe)?.success() {
            log::info!("[{}] runtime environment already present", session.host);
            return Ok(false);
        }

        let venv = self.layout.venv.as_str();
        session.run(step, &self.layout.service_command(["mkdir", "-p", venv]))?;
        session.run(
            step,
            &self.layout.service_command([
                "virtualenv",
                "--python",
                "python3",
                "--system-site-packages",
                venv,
            ]),
        )?;

        log::info!("[{}] created runtime environment at {}", session.host, venv);
        Ok(true)
    }

    /// Upgrade packages to the versions pinned by the synced manifest
    pub fn upgrade(&self, session: &HostSession<'_>) -> Result<()> {
        let pip = self.layout.venv_bin("pip");
        let manifest = self.layout.requirements_path();

        session.run(
            StepKind::DependencyUpgrade,
            &self.layout.service_command([
                pip.as_str(),
                "install",
                "--upgrade",
                "-r",
                manifest.as_str(),
            ]),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use crate::environment::{Environment, EnvironmentKind};
    use crate::error::Error;
    use crate::testing::MockTransport;
    use crate::types::Host;

    fn with_session<T>(
        transport: &MockTransport,
        f: impl FnOnce(&DependencyInstaller<'_>, &HostSession<'_>) -> T,
    ) -> T {
        let layout = RemoteLayout::default();
        let host = Host::new("web1");
        let environment = Environment::new(EnvironmentKind::Production, layout.config_root.clone());
        let cancel = CancelToken::new();
        let session = HostSession::new(&host, &environment, transport, &cancel);
        f(&DependencyInstaller::new(&layout), &session)
    }

    #[test]
    fn test_upgrade_uses_manifest_in_config_root() {
        let transport = MockTransport::new();
        with_session(&transport, |d, s| d.upgrade(s)).unwrap();

        assert_eq!(
            transport.commands_for("web1"),
            vec![
                "/srv/wikilabels/venv/bin/pip install --upgrade -r /srv/wikilabels/src/requirements.txt"
            ]
        );
    }

    #[test]
    fn test_upgrade_failure_is_reported() {
        let transport = MockTransport::new();
        transport.fail_on("web1", "pip install", 1, "ResolutionImpossible");

        let err = with_session(&transport, |d, s| d.upgrade(s)).unwrap_err();
        assert!(matches!(
            err,
            Error::CommandFailed { stderr, .. } if stderr == "ResolutionImpossible"
        ));
    }

    #[test]
    fn test_setup_creates_fresh_environment() {
        let transport = MockTransport::new();
        let created = with_session(&transport, |d, s| d.setup(s)).unwrap();

        assert!(created);
        let commands = transport.commands_for("web1");
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1], "mkdir -p /srv/wikilabels/venv");
        assert!(commands[2].starts_with("virtualenv --python python3"));
    }

    #[test]
    fn test_setup_leaves_existing_environment() {
        let transport = MockTransport::new();
        transport.mark_existing("web1", "/srv/wikilabels/venv/bin/pip");

        let created = with_session(&transport, |d, s| d.setup(s)).unwrap();
        assert!(!created);
        assert_eq!(transport.commands_for("web1").len(), 1);
    }
}
