//! # reconcile
//!
//! Host-parallel, step-sequential reconciliation engine for role-scoped
//! deployments.
//!
//! This crate provides:
//! - A static role → host registry and branch → environment resolution
//! - Named operations, each a fixed ordered pipeline of steps
//! - Step engines: config sync, runtime setup, dependency upgrade,
//!   credential distribution, service restart, schema load
//! - An orchestrator that runs a pipeline on every host of a role in
//!   parallel, isolating failures per host
//!
//! Remote access goes through the [`Transport`] trait; this crate never
//! opens a connection itself.
//!
//! ## Example
//!
//! ```no_run
//! use reconcile::{
//!     NoProgress, Operation, OperationRequest, Orchestrator, OrchestratorConfig, RoleRegistry,
//!     Transport,
//! };
//!
//! fn deploy<T: Transport>(transport: T) -> reconcile::Result<bool> {
//!     let config = OrchestratorConfig {
//!         registry: RoleRegistry::new().with_role("web", ["web-1", "web-2"]),
//!         ..OrchestratorConfig::default()
//!     };
//!     let orchestrator = Orchestrator::new(config, transport);
//!
//!     let report = orchestrator.run(&OperationRequest::new(Operation::Deploy), &NoProgress)?;
//!     for host in &report.hosts {
//!         println!("{}: {:?}", host.host, host.status);
//!     }
//!     Ok(report.is_success())
//! }
//! ```

#![warn(clippy::all)]

pub mod context;
pub mod environment;
pub mod error;
pub mod layout;
pub mod operation;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod steps;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use context::{CancelToken, HostSession};
pub use environment::{Environment, EnvironmentKind, EnvironmentResolver};
pub use error::{Error, ErrorCategory, Result};
pub use layout::RemoteLayout;
pub use operation::{Operation, ROLE_DATABASE, ROLE_STAGING, ROLE_WEB};
pub use orchestrator::{
    NoProgress, OperationRequest, Orchestrator, OrchestratorConfig, Plan, ProgressCallback,
};
pub use registry::RoleRegistry;
pub use retry::{LogCallback, RetryCallback, RetryConfig, with_retry, with_retry_cancellable};
pub use steps::{CredentialSource, DatabaseSettings, HealthProbe, HttpProbe, ServiceSettings};
pub use transport::{Privilege, RemoteCommand, ServiceIdentity, Transport, shell_join, shell_quote};
pub use types::{
    CommandOutput, Host, HostReport, HostStatus, OperationReport, RemotePath, StepKind,
    StepRecord, StepResult,
};
