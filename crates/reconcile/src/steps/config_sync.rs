//! Config sync - converge the config working copy to the environment branch
//!
//! fetch → hard reset to `origin/<branch>` → recursive submodule sync/update.
//! A failed fetch leaves the tree untouched. Anything failing after the fetch
//! is reported as a state inconsistency and never resumed automatically:
//! restarting halfway through a reset risks mismatched submodule pins.

use crate::context::HostSession;
use crate::error::Result;
use crate::layout::RemoteLayout;
use crate::types::StepKind;

const STEP: StepKind = StepKind::ConfigSync;

pub struct ConfigSyncEngine<'a> {
    layout: &'a RemoteLayout,
}

impl<'a> ConfigSyncEngine<'a> {
    pub fn new(layout: &'a RemoteLayout) -> Self {
        Self { layout }
    }

    fn git(&self, session: &HostSession<'_>, args: &[&str]) -> Result<String> {
        let root = session.environment.config_root().as_str();
        let argv = ["git", "-C", root].into_iter().chain(args.iter().copied());
        let output = session.run(STEP, &self.layout.service_command(argv))?;
        Ok(output.stdout)
    }

    /// Sync the host and return the commit it now sits on
    pub fn sync(&self, session: &HostSession<'_>) -> Result<String> {
        let host = session.host.as_str();
        let target = session.environment.remote_ref();

        self.git(session, &["fetch", "origin"])?;

        self.git(session, &["reset", "--hard", &target]).map_err(|e| {
            e.inconsistent(host, STEP, format!("fetched, but reset to {target} failed"))
        })?;

        self.git(session, &["submodule", "sync", "--recursive"])
            .and_then(|_| self.git(session, &["submodule", "update", "--init", "--recursive"]))
            .map_err(|e| {
                e.inconsistent(
                    host,
                    STEP,
                    format!("reset to {target}, but submodules are not at their pinned commits"),
                )
            })?;

        let revision = self
            .git(session, &["rev-parse", "HEAD"])
            .map_err(|e| e.inconsistent(host, STEP, "synced, but HEAD could not be read back"))?;

        let revision = revision.trim().to_string();
        log::info!("[{}] config at {} ({})", host, target, revision);
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use crate::environment::{Environment, EnvironmentKind};
    use crate::error::{Error, ErrorCategory};
    use crate::testing::MockTransport;
    use crate::types::Host;

    fn sync(transport: &MockTransport, kind: EnvironmentKind) -> Result<String> {
        let layout = RemoteLayout::default();
        let host = Host::new("web1");
        let environment = Environment::new(kind, layout.config_root.clone());
        let cancel = CancelToken::new();
        let session = HostSession::new(&host, &environment, transport, &cancel);
        ConfigSyncEngine::new(&layout).sync(&session)
    }

    #[test]
    fn test_sync_runs_steps_in_order_with_absolute_paths() {
        let transport = MockTransport::new();
        sync(&transport, EnvironmentKind::Production).unwrap();

        assert_eq!(
            transport.commands_for("web1"),
            vec![
                "git -C /srv/wikilabels/src fetch origin",
                "git -C /srv/wikilabels/src reset --hard origin/deploy",
                "git -C /srv/wikilabels/src submodule sync --recursive",
                "git -C /srv/wikilabels/src submodule update --init --recursive",
                "git -C /srv/wikilabels/src rev-parse HEAD",
            ]
        );
    }

    #[test]
    fn test_sync_is_idempotent() {
        let transport = MockTransport::new();
        transport.make_dirty("web1");

        let first = sync(&transport, EnvironmentKind::Production).unwrap();
        let after_first = transport.checkout("web1");
        let second = sync(&transport, EnvironmentKind::Production).unwrap();
        let after_second = transport.checkout("web1");

        assert_eq!(first, "d3p10y");
        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert!(!after_second.dirty);
        assert_eq!(after_second.submodules.as_deref(), Some("d3p10y"));
    }

    #[test]
    fn test_resync_follows_moved_branch_head() {
        let transport = MockTransport::new();
        assert_eq!(sync(&transport, EnvironmentKind::Production).unwrap(), "d3p10y");

        transport.set_remote_head("deploy", "n3wc0m");
        let moved = sync(&transport, EnvironmentKind::Production).unwrap();
        let after_moved = transport.checkout("web1");
        assert_eq!(moved, "n3wc0m");
        assert_eq!(after_moved.submodules.as_deref(), Some("n3wc0m"));

        assert_eq!(sync(&transport, EnvironmentKind::Production).unwrap(), "n3wc0m");
        assert_eq!(transport.checkout("web1"), after_moved);
    }

    #[test]
    fn test_staging_tracks_master() {
        let transport = MockTransport::new();
        let revision = sync(&transport, EnvironmentKind::Staging).unwrap();
        assert_eq!(revision, "ma5732");
        assert!(
            transport
                .commands_for("web1")
                .contains(&"git -C /srv/wikilabels/src reset --hard origin/master".to_string())
        );
    }

    #[test]
    fn test_fetch_failure_is_plain_transport_error() {
        let transport = MockTransport::new();
        transport.fail_on("web1", "fetch origin", 128, "Could not resolve host");

        let err = sync(&transport, EnvironmentKind::Production).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert_eq!(transport.commands_for("web1").len(), 1);
        assert_eq!(transport.checkout("web1").head, None);
    }

    #[test]
    fn test_reset_failure_is_inconsistent_and_stops() {
        let transport = MockTransport::new();
        transport.fail_on("web1", "reset --hard", 1, "index.lock exists");

        let err = sync(&transport, EnvironmentKind::Production).unwrap_err();
        assert!(matches!(
            err,
            Error::Inconsistent {
                step: StepKind::ConfigSync,
                ..
            }
        ));
        assert!(
            !transport
                .commands_for("web1")
                .iter()
                .any(|c| c.contains("submodule"))
        );
    }

    #[test]
    fn test_submodule_failure_is_inconsistent() {
        let transport = MockTransport::new();
        transport.fail_on("web1", "submodule update", 1, "reference is not a tree");

        let err = sync(&transport, EnvironmentKind::Production).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::StateInconsistency);
        assert_eq!(err.remote_output().unwrap().1, "reference is not a tree");
    }
}
