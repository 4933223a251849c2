use std::sync::Arc;
use tubeline_core::{Config, DownloadDispatcher, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    dispatcher: Arc<DownloadDispatcher>,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Arc<DownloadDispatcher>) -> Self {
        Self { config, dispatcher }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn dispatcher(&self) -> &Arc<DownloadDispatcher> {
        &self.dispatcher
    }
}
