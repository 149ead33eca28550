use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::ui::{self, StaticAssets};
use crate::workdir::WorkDir;
use minijinja::Environment;
use std::sync::Arc;

/// Shared application state
///
/// Built once at startup and never mutated; the publish endpoint holds the
/// same [`WorkDir`] handle.
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Root of all published projects
    pub work_dir: Arc<WorkDir>,

    /// Source of `/static` assets
    pub assets: Arc<StaticAssets>,

    /// Page templates
    pub templates: Arc<Environment<'static>>,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let work_dir = WorkDir::open(&config.work_dir).map_err(|e| {
            ServerError::Config(format!(
                "cannot use work directory {}: {e}",
                config.work_dir.display()
            ))
        })?;

        let assets = StaticAssets::from_dir(config.static_dir.as_deref())
            .map_err(|e| ServerError::Config(format!("cannot use static directory: {e}")))?;

        let templates = ui::templates()
            .map_err(|e| ServerError::Config(format!("invalid page template: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            work_dir: Arc::new(work_dir),
            assets: Arc::new(assets),
            templates: Arc::new(templates),
        })
    }
}
