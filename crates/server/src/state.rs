use chrono::{DateTime, Utc};
use std::sync::Arc;
use convertino_core::{Config, JobExecutor, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    executor: Arc<JobExecutor>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, executor: Arc<JobExecutor>) -> Self {
        Self {
            config,
            executor,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
