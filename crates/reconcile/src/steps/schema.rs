//! Database steps, delegated to the application's own entry points

use serde::{Deserialize, Serialize};

use crate::context::HostSession;
use crate::error::Result;
use crate::layout::RemoteLayout;
use crate::transport::RemoteCommand;
use crate::types::StepKind;

/// How the application manages its schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Application executable inside the runtime environment
    pub app_command: String,
    /// Config file handed to `load_schema`, relative to the config root
    pub schema_config: String,
    /// Database role owned by the application
    pub db_user: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            app_command: "wikilabels".to_string(),
            schema_config: "config/ores.wmflabs.org.yaml".to_string(),
            db_user: "wikilabels".to_string(),
        }
    }
}

pub struct SchemaLoader<'a> {
    layout: &'a RemoteLayout,
    settings: &'a DatabaseSettings,
}

impl<'a> SchemaLoader<'a> {
    pub fn new(layout: &'a RemoteLayout, settings: &'a DatabaseSettings) -> Self {
        Self { layout, settings }
    }

    /// The schema-load command; it only creates what is missing
    pub fn load_command(&self) -> RemoteCommand {
        let app = self.layout.venv_bin(&self.settings.app_command);
        let config = self.layout.config_root.join(&self.settings.schema_config);
        self.layout
            .service_command([app.as_str(), "load_schema", config.as_str()])
    }

    pub fn load(&self, session: &HostSession<'_>) -> Result<()> {
        session.run(StepKind::SchemaLoad, &self.load_command())?;
        log::info!("[{}] schema loaded", session.host);
        Ok(())
    }

    /// Create the database role; an existing role counts as success
    ///
    /// Returns `false` if the role was already there.
    pub fn create_user(&self, session: &HostSession<'_>) -> Result<bool> {
        let step = StepKind::DbUserCreate;
        let command =
            RemoteCommand::new(["createuser", self.settings.db_user.as_str(), "--createdb"])
                .as_root();

        match session.run(step, &command) {
            Ok(_) => Ok(true),
            Err(e) if e.is_ignorable() => {
                log::info!(
                    "[{}] database role {} already exists",
                    session.host,
                    self.settings.db_user
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
