use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Upload and output areas are distinct
/// - Size ceiling, concurrency and timeouts are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.storage.upload_dir == config.storage.output_dir {
        return Err(ConfigError::ValidationError(
            "storage.upload_dir and storage.output_dir must differ".to_string(),
        ));
    }

    if config.storage.max_upload_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "storage.max_upload_bytes cannot be 0".to_string(),
        ));
    }

    if config.storage.max_files_per_job == 0 {
        return Err(ConfigError::ValidationError(
            "storage.max_files_per_job cannot be 0".to_string(),
        ));
    }

    if config.jobs.max_concurrent_jobs == 0 {
        return Err(ConfigError::ValidationError(
            "jobs.max_concurrent_jobs cannot be 0".to_string(),
        ));
    }

    let timeouts = [
        ("engines.process_timeout_secs", config.engines.process_timeout_secs),
        ("jobs.job_timeout_secs", config.jobs.job_timeout_secs),
        ("fetch.connect_timeout_secs", config.fetch.connect_timeout_secs),
        ("fetch.read_timeout_secs", config.fetch.read_timeout_secs),
        ("fetch.download_timeout_secs", config.fetch.download_timeout_secs),
    ];
    if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
        return Err(ConfigError::ValidationError(format!("{} cannot be 0", name)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_shared_directories_fail() {
        let mut config = Config::default();
        config.storage.upload_dir = PathBuf::from("/data/shared");
        config.storage.output_dir = PathBuf::from("/data/shared");
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_validate_zero_timeout_names_field() {
        let mut config = Config::default();
        config.fetch.read_timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("fetch.read_timeout_secs"));
    }

    #[test]
    fn test_validate_zero_ceiling_fails() {
        let mut config = Config::default();
        config.storage.max_upload_bytes = 0;
        assert!(validate_config(&config).is_err());
    }
}
