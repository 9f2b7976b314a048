//! Orchestrator - plans an operation and runs it host-parallel, step-sequential
//!
//! Planning is pure: role, host filter and branch are resolved before any
//! remote action, so resolution errors never touch a host. Execution runs one
//! task per host on a rayon pool. Within a host, steps run in order and the
//! first failure stops that host; sibling hosts carry on. Nothing is rolled
//! back.

use chrono::Utc;
use rayon::prelude::*;
use std::time::Instant;

use crate::context::{CancelToken, HostSession};
use crate::environment::{Environment, EnvironmentResolver};
use crate::error::{Error, Result};
use crate::layout::RemoteLayout;
use crate::operation::Operation;
use crate::registry::RoleRegistry;
use crate::steps::{
    ConfigSyncEngine, CredentialDistributor, CredentialSource, DatabaseSettings,
    DependencyInstaller, HealthProbe, HttpProbe, SchemaLoader, ServiceController,
    ServiceSettings,
};
use crate::transport::Transport;
use crate::types::{
    Host, HostReport, HostStatus, OperationReport, StepKind, StepRecord, StepResult,
};

/// Everything about the fleet that is fixed for the lifetime of a run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub registry: RoleRegistry,
    pub layout: RemoteLayout,
    pub service: ServiceSettings,
    pub database: DatabaseSettings,
    pub credentials: CredentialSource,
    /// Hosts reconciled at once
    pub jobs: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            registry: RoleRegistry::new(),
            layout: RemoteLayout::default(),
            service: ServiceSettings::default(),
            database: DatabaseSettings::default(),
            credentials: CredentialSource::new("."),
            jobs: 4,
        }
    }
}

/// What the operator asked for
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub operation: Operation,
    pub role: Option<String>,
    pub hosts: Option<Vec<Host>>,
    pub branch: Option<String>,
}

impl OperationRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            role: None,
            hosts: None,
            branch: None,
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn hosts<I, H>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<Host>,
    {
        self.hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// A fully resolved operation, ready to execute
#[derive(Debug, Clone)]
pub struct Plan {
    pub operation: Operation,
    pub role: String,
    pub hosts: Vec<Host>,
    pub environment: Environment,
}

impl Plan {
    pub fn steps(&self) -> &'static [StepKind] {
        self.operation.steps()
    }
}

/// Progress callback for execution
///
/// Called from worker threads, so implementations must be `Sync`.
pub trait ProgressCallback: Sync {
    fn on_step_start(&self, host: &Host, step: StepKind);
    fn on_step_complete(&self, host: &Host, step: StepKind, result: &StepResult);
    fn on_host_complete(&self, report: &HostReport);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_step_start(&self, _host: &Host, _step: StepKind) {}
    fn on_step_complete(&self, _host: &Host, _step: StepKind, _result: &StepResult) {}
    fn on_host_complete(&self, _report: &HostReport) {}
}

pub struct Orchestrator<T: Transport> {
    config: OrchestratorConfig,
    transport: T,
    probe: Box<dyn HealthProbe>,
    cancel: CancelToken,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(config: OrchestratorConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            probe: Box::new(HttpProbe::default()),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_probe(mut self, probe: impl HealthProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Resolve role, hosts and environment without contacting any host
    pub fn plan(&self, request: &OperationRequest) -> Result<Plan> {
        let operation = request.operation;
        let role = request
            .role
            .as_deref()
            .unwrap_or_else(|| operation.default_role());

        if !operation.roles().contains(&role) {
            return Err(Error::RoleNotAllowed {
                operation: operation.name().to_string(),
                role: role.to_string(),
            });
        }

        let branch = match (operation.fixed_branch(), request.branch.as_deref()) {
            (Some(required), Some(branch)) if branch != required => {
                return Err(Error::FixedBranch {
                    operation: operation.name().to_string(),
                    branch: branch.to_string(),
                    required: required.to_string(),
                });
            }
            (_, Some(branch)) => branch,
            (_, None) => operation.default_branch(role),
        };

        let environment =
            EnvironmentResolver::new(self.config.layout.config_root.clone()).resolve(branch)?;
        let hosts = self.config.registry.select(role, request.hosts.as_deref())?;

        Ok(Plan {
            operation,
            role: role.to_string(),
            hosts,
            environment,
        })
    }

    /// Run a plan on every host and collect per-host reports
    pub fn execute(&self, plan: &Plan, progress: &dyn ProgressCallback) -> Result<OperationReport> {
        let started_at = Utc::now();
        log::info!(
            "{} on role {} ({} host(s), {} from {})",
            plan.operation,
            plan.role,
            plan.hosts.len(),
            plan.environment.name(),
            plan.environment.remote_ref()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs.max(1))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create host thread pool: {e}")))?;

        let hosts: Vec<HostReport> = pool.install(|| {
            plan.hosts
                .par_iter()
                .map(|host| self.reconcile_host(plan, host, progress))
                .collect()
        });

        Ok(OperationReport {
            operation: plan.operation.name().to_string(),
            role: plan.role.clone(),
            environment: plan.environment.name().to_string(),
            branch: plan.environment.branch().to_string(),
            started_at,
            finished_at: Utc::now(),
            hosts,
        })
    }

    /// Plan and execute in one go
    pub fn run(
        &self,
        request: &OperationRequest,
        progress: &dyn ProgressCallback,
    ) -> Result<OperationReport> {
        let plan = self.plan(request)?;
        self.execute(&plan, progress)
    }

    fn reconcile_host(
        &self,
        plan: &Plan,
        host: &Host,
        progress: &dyn ProgressCallback,
    ) -> HostReport {
        let session = HostSession::new(host, &plan.environment, &self.transport, &self.cancel);
        let mut status = HostStatus::Converged;
        let mut revision = None;
        let mut steps = Vec::with_capacity(plan.steps().len());

        for &step in plan.steps() {
            if status != HostStatus::Converged {
                steps.push(StepRecord {
                    step,
                    result: StepResult::NotRun,
                    duration_ms: 0,
                });
                continue;
            }

            progress.on_step_start(host, step);
            let started = Instant::now();

            let result = match self.run_step(step, &session) {
                Ok(detail) => {
                    if step == StepKind::ConfigSync {
                        revision.clone_from(&detail);
                    }
                    StepResult::Completed { detail }
                }
                Err(e) => {
                    log::error!("[{}] {} failed: {}", host, step, e);
                    status = match e {
                        Error::Interrupted { .. } | Error::TimedOut { .. } => {
                            HostStatus::Interrupted { step }
                        }
                        _ => HostStatus::Failed { step },
                    };
                    StepResult::from_error(&e)
                }
            };

            progress.on_step_complete(host, step, &result);
            steps.push(StepRecord {
                step,
                result,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let report = HostReport {
            host: host.clone(),
            status,
            revision,
            steps,
        };
        progress.on_host_complete(&report);
        report
    }

    fn run_step(&self, step: StepKind, session: &HostSession<'_>) -> Result<Option<String>> {
        let config = &self.config;
        let presence = |created: bool| {
            Some(if created { "created" } else { "already present" }.to_string())
        };

        match step {
            StepKind::RuntimeSetup => DependencyInstaller::new(&config.layout)
                .setup(session)
                .map(presence),
            StepKind::ConfigSync => ConfigSyncEngine::new(&config.layout)
                .sync(session)
                .map(Some),
            StepKind::DependencyUpgrade => DependencyInstaller::new(&config.layout)
                .upgrade(session)
                .map(|()| None),
            StepKind::CredentialDistribute => {
                CredentialDistributor::new(&config.layout, &config.credentials)
                    .distribute(session)
                    .map(|count| Some(format!("{count} file(s)")))
            }
            StepKind::ServiceRestart => ServiceController::new(&config.service, self.probe.as_ref())
                .restart(session)
                .map(|url| url.map(|u| format!("healthy at {u}"))),
            StepKind::SchemaLoad => SchemaLoader::new(&config.layout, &config.database)
                .load(session)
                .map(|()| None),
            StepKind::DbUserCreate => SchemaLoader::new(&config.layout, &config.database)
                .create_user(session)
                .map(presence),
        }
    }
}
