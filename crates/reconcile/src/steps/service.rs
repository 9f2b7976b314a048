//! Service controller - restart, with an optional post-restart health probe

use std::collections::HashMap;
use std::time::Duration;

use crate::context::HostSession;
use crate::environment::EnvironmentKind;
use crate::error::{Error, Result};
use crate::retry::{LogCallback, RetryConfig, with_retry_cancellable};
use crate::transport::RemoteCommand;
use crate::types::StepKind;

const STEP: StepKind = StepKind::ServiceRestart;

/// How the managed service is restarted and checked
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Command run as root to restart the service
    pub restart: Vec<String>,
    /// Health URL per environment; `{host}` is replaced by the host name
    pub health_urls: HashMap<EnvironmentKind, String>,
    pub health_retry: RetryConfig,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            restart: vec!["uwsgictl".to_string(), "restart".to_string()],
            health_urls: HashMap::new(),
            health_retry: RetryConfig {
                max_attempts: 5,
                base_delay: Duration::from_secs(2),
                backoff_factor: 2.0,
                max_delay: Duration::from_secs(30),
            },
        }
    }
}

impl ServiceSettings {
    pub fn health_url(&self, kind: EnvironmentKind, host: &str) -> Option<String> {
        self.health_urls
            .get(&kind)
            .map(|url| url.replace("{host}", host))
    }
}

/// Checks whether a service answers at a URL
pub trait HealthProbe: Send + Sync {
    /// `Err` carries a short reason (status code or connection error)
    fn check(&self, url: &str) -> std::result::Result<(), String>;
}

/// HTTP GET probe; any 2xx is healthy
pub struct HttpProbe {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            timeout,
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl HealthProbe for HttpProbe {
    fn check(&self, url: &str) -> std::result::Result<(), String> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", "deckhand-health")
            .config()
            .timeout_global(Some(self.timeout))
            .build()
            .call();

        match response {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(code)) => Err(format!("HTTP {code}")),
            Err(e) => Err(e.to_string()),
        }
    }
}

pub struct ServiceController<'a> {
    settings: &'a ServiceSettings,
    probe: &'a dyn HealthProbe,
}

impl<'a> ServiceController<'a> {
    pub fn new(settings: &'a ServiceSettings, probe: &'a dyn HealthProbe) -> Self {
        Self { settings, probe }
    }

    /// Restart the service; if a health URL is configured, wait for it
    ///
    /// Returns the URL that answered, if one was probed.
    pub fn restart(&self, session: &HostSession<'_>) -> Result<Option<String>> {
        let host = session.host.as_str();
        let command = RemoteCommand::new(self.settings.restart.iter().cloned()).as_root();
        session.run(STEP, &command)?;
        log::info!("[{}] restarted service", host);

        let Some(url) = self.settings.health_url(session.environment.kind(), host) else {
            return Ok(None);
        };

        let retry = &self.settings.health_retry;
        with_retry_cancellable(retry, Some(&LogCallback), session.cancel_token(), || {
            session.checkpoint(STEP)?;
            self.probe.check(&url).map_err(|message| Error::Unhealthy {
                host: host.to_string(),
                url: url.clone(),
                message,
            })
        })?;

        log::info!("[{}] healthy at {}", host, url);
        Ok(Some(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use crate::environment::Environment;
    use crate::testing::{Call, MockTransport};
    use crate::transport::Privilege;
    use crate::types::{Host, RemotePath};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProbe {
        failures_left: AtomicU32,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl FlakyProbe {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl HealthProbe for FlakyProbe {
        fn check(&self, url: &str) -> std::result::Result<(), String> {
            self.seen.lock().unwrap().push(url.to_string());
            if self.failures_left.load(Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                Err("HTTP 502".to_string())
            }
        }
    }

    fn settings(with_health: bool) -> ServiceSettings {
        let mut settings = ServiceSettings {
            health_retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                backoff_factor: 1.0,
                max_delay: Duration::from_millis(5),
            },
            ..ServiceSettings::default()
        };
        if with_health {
            settings.health_urls.insert(
                EnvironmentKind::Production,
                "http://{host}:8080/health".to_string(),
            );
        }
        settings
    }

    fn restart(
        transport: &MockTransport,
        settings: &ServiceSettings,
        probe: &dyn HealthProbe,
    ) -> Result<Option<String>> {
        let host = Host::new("web1");
        let environment =
            Environment::new(EnvironmentKind::Production, RemotePath::new("/srv/app"));
        let cancel = CancelToken::new();
        let session = HostSession::new(&host, &environment, transport, &cancel);
        ServiceController::new(settings, probe).restart(&session)
    }

    #[test]
    fn test_restart_runs_as_root_without_probe() {
        let transport = MockTransport::new();
        let probe = FlakyProbe::new(0);

        let probed = restart(&transport, &settings(false), &probe).unwrap();

        assert_eq!(probed, None);
        assert!(probe.seen.lock().unwrap().is_empty());
        assert_eq!(
            transport.calls(),
            vec![Call::Exec {
                host: "web1".to_string(),
                command: "uwsgictl restart".to_string(),
                privilege: Privilege::Root,
            }]
        );
    }

    #[test]
    fn test_probe_retries_until_healthy() {
        let transport = MockTransport::new();
        let probe = FlakyProbe::new(2);

        let probed = restart(&transport, &settings(true), &probe).unwrap();

        assert_eq!(probed.as_deref(), Some("http://web1:8080/health"));
        assert_eq!(probe.seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_probe_gives_up() {
        let transport = MockTransport::new();
        let probe = FlakyProbe::new(10);

        let err = restart(&transport, &settings(true), &probe).unwrap_err();
        assert!(matches!(err, Error::Unhealthy { message, .. } if message == "HTTP 502"));
    }

    #[test]
    fn test_cancel_during_probe_backoff_interrupts_restart() {
        struct CancellingProbe(CancelToken);
        impl HealthProbe for CancellingProbe {
            fn check(&self, _url: &str) -> std::result::Result<(), String> {
                self.0.cancel();
                Err("HTTP 503".to_string())
            }
        }

        let transport = MockTransport::new();
        let mut settings = settings(true);
        settings.health_retry = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(20),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(20),
        };
        let cancel = CancelToken::new();
        let probe = CancellingProbe(cancel.clone());
        let host = Host::new("web1");
        let environment =
            Environment::new(EnvironmentKind::Production, RemotePath::new("/srv/app"));
        let session = HostSession::new(&host, &environment, &transport, &cancel);
        let started = std::time::Instant::now();

        let err = ServiceController::new(&settings, &probe)
            .restart(&session)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Interrupted {
                step: StepKind::ServiceRestart,
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_failed_restart_skips_probe() {
        let transport = MockTransport::new();
        transport.fail_on("web1", "uwsgictl", 1, "no such service");
        let probe = FlakyProbe::new(0);

        assert!(restart(&transport, &settings(true), &probe).is_err());
        assert!(probe.seen.lock().unwrap().is_empty());
    }
}
