pub mod config;
pub mod converter;
pub mod job;
pub mod metrics;
pub mod staging;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use converter::{ConvertError, Converter, ConverterRegistry, ErrorKind, Operation, Params};
pub use job::{CompletedJob, Delivery, Job, JobExecutor, JobFailure, JobId, JobState};
pub use staging::{StagedFile, StagingStore};
