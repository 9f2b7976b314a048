//! The components an operation pipeline is composed of
//!
//! Each component owns one [`StepKind`](crate::types::StepKind) (the
//! dependency installer owns two) and acts on a single host through a
//! [`HostSession`](crate::context::HostSession).

pub mod config_sync;
pub mod credentials;
pub mod dependencies;
pub mod schema;
pub mod service;

pub use config_sync::ConfigSyncEngine;
pub use credentials::{CredentialBundle, CredentialDistributor, CredentialSource};
pub use dependencies::DependencyInstaller;
pub use schema::{DatabaseSettings, SchemaLoader};
pub use service::{HealthProbe, HttpProbe, ServiceController, ServiceSettings};
